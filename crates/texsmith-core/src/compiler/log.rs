//! Engine log parsing: fatal-error excerpts and warning extraction.

use std::sync::OnceLock;

use regex::Regex;

/// Fatal-error lines in the engine log start with this marker.
pub const FATAL_MARKER: char = '!';

/// Lines captured after each fatal marker.
pub const DIAGNOSTIC_WINDOW: usize = 5;

pub const MAX_DIAGNOSTIC_LINES: usize = 30;

/// Tail of stdout/stderr used when the log has no fatal marker.
pub const OUTPUT_TAIL_CHARS: usize = 2000;

pub const MAX_DIAGNOSTIC_CHARS: usize = 3000;

pub const MAX_WARNINGS: usize = 30;

fn warning_patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?m)^(Overfull \\[hv]box .+)$",
            r"(?m)^(Underfull \\[hv]box .+)$",
            r"(?m)^(LaTeX Warning: .+)$",
            r"(?m)^(Package \S+ Warning: .+)$",
        ]
        .map(|pattern| Regex::new(pattern).expect("warning pattern is valid"))
    })
}

/// Collect fatal-error windows from a log.
///
/// A line starting with [`FATAL_MARKER`] opens a window of itself plus up to
/// [`DIAGNOSTIC_WINDOW`] following lines; a marker inside a window opens a
/// fresh one. Collection stops at [`MAX_DIAGNOSTIC_LINES`].
pub fn fatal_lines(log: &str) -> Vec<&str> {
    let mut collected = Vec::new();
    let mut window_left = 0usize;

    for line in log.lines() {
        if line.starts_with(FATAL_MARKER) {
            collected.push(line.trim_end());
            window_left = DIAGNOSTIC_WINDOW;
        } else if window_left > 0 {
            collected.push(line.trim_end());
            window_left -= 1;
        }
        if collected.len() >= MAX_DIAGNOSTIC_LINES {
            break;
        }
    }

    collected
}

/// Build the bounded diagnostic for a failed engine run.
///
/// Uses the fatal windows of `log` when any exist, otherwise the tail of
/// `stdout` (or `stderr` when stdout is empty).
pub fn extract_diagnostic(log: Option<&str>, stdout: &str, stderr: &str) -> String {
    let windows = log.map(fatal_lines).unwrap_or_default();
    let text = if !windows.is_empty() {
        windows.join("\n")
    } else if !stdout.trim().is_empty() {
        tail_chars(stdout, OUTPUT_TAIL_CHARS).to_string()
    } else {
        tail_chars(stderr, OUTPUT_TAIL_CHARS).to_string()
    };
    head_chars(&text, MAX_DIAGNOSTIC_CHARS).to_string()
}

/// Extract warning lines from a successful run's log, grouped by pattern
/// (box notices first, then generic and package warnings), capped at
/// [`MAX_WARNINGS`].
pub fn extract_warnings(log: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    for pattern in warning_patterns() {
        for captures in pattern.captures_iter(log) {
            warnings.push(captures[1].trim().to_string());
            if warnings.len() >= MAX_WARNINGS {
                return warnings;
            }
        }
    }
    warnings
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

fn head_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
