//! Deterministic clean-up of generated LaTeX before it reaches the engine.
//!
//! A pass runs five steps in order:
//!
//! 1. strip enclosing code fences
//! 2. crop to (or synthesize) `\begin{document}` .. `\end{document}`
//! 3. delete glyphs the engine cannot render (emoji and symbol blocks)
//! 4. delete constructs that break compilation or add nondeterminism
//! 5. rebalance `\begin{..}` / `\end{..}` markers
//!
//! Later steps can expose new matches for earlier ones (deleting an emoji can
//! join two halves of a command), so [`sanitize`] repeats the pass until the
//! text stops changing. After the first pass every change deletes text or
//! closes a region that was open, so the loop ends.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

pub const DOCUMENT_BEGIN: &str = r"\begin{document}";
pub const DOCUMENT_END: &str = r"\end{document}";

const DOCUMENT_REGION: &str = "document";
const FENCE: &str = "```";

/// Sanitize raw generation output into a balanced document body.
///
/// Total: any input yields a body that starts with [`DOCUMENT_BEGIN`], ends
/// with [`DOCUMENT_END`] and closes every region it opens.
pub fn sanitize(raw: &str) -> String {
    let mut current = sanitize_pass(raw);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Clean a caller-supplied fragment (such as a signature block) so it can be
/// placed inside an already sanitized body: glyphs and hazardous constructs
/// are removed, document markers dropped, and the fragment's own regions
/// balanced.
pub fn sanitize_fragment(fragment: &str) -> String {
    let mut current = fragment
        .replace(DOCUMENT_BEGIN, "")
        .replace(DOCUMENT_END, "");
    loop {
        let next = balance_regions(&strip_hazardous_constructs(&strip_unsupported_glyphs(&current)));
        if next == current {
            return current.trim().to_string();
        }
        current = next;
    }
}

/// Names of regions opened and never closed, in opening order.
/// The document region itself is not reported.
pub fn unclosed_regions(text: &str) -> Vec<String> {
    let markers = scan_markers(text);
    let (stack, _) = match_markers(&markers);
    stack
        .into_iter()
        .map(|idx| markers[idx].name.to_string())
        .collect()
}

fn sanitize_pass(text: &str) -> String {
    let text = strip_code_fences(text);
    let text = ensure_document_boundaries(text);
    let text = strip_unsupported_glyphs(&text);
    let text = strip_hazardous_constructs(&text);
    balance_regions(&text)
}

fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with(FENCE) {
        body = match body.find('\n') {
            Some(idx) => &body[idx + 1..],
            None => "",
        };
    }
    let trimmed = body.trim_end();
    if let Some(stripped) = trimmed.strip_suffix(FENCE) {
        body = stripped;
    }
    body.trim()
}

fn ensure_document_boundaries(text: &str) -> String {
    match text.find(DOCUMENT_BEGIN) {
        Some(begin) => {
            let from_begin = &text[begin..];
            match from_begin.find(DOCUMENT_END) {
                Some(end) => from_begin[..end + DOCUMENT_END.len()].to_string(),
                None => format!("{}\n{}", from_begin.trim_end(), DOCUMENT_END),
            }
        }
        None => {
            let content = match text.find(DOCUMENT_END) {
                Some(end) => &text[..end],
                None => text,
            };
            format!("{}\n{}\n{}", DOCUMENT_BEGIN, content.trim(), DOCUMENT_END)
        }
    }
}

fn is_unsupported_glyph(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0x2300..=0x23FF
            | 0xFE00..=0xFE0F
            | 0x200D
            | 0x20E3
            | 0xE0000..=0xE007F
    )
}

fn strip_unsupported_glyphs(text: &str) -> String {
    text.chars().filter(|c| !is_unsupported_glyph(*c)).collect()
}

fn hazard_patterns() -> &'static [Regex; 5] {
    static PATTERNS: OnceLock<[Regex; 5]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // seeded randomness
            r"\\pgfmathsetseed\{[^{}\n]*\}",
            r"\\pgfmathrandom[A-Za-z]*(?:\{[^{}\n]*\})*",
            // single-line low-level conditionals
            r"\\if(?:num|dim|x|odd)\b[^\n]*?\\fi\b",
            // evaluate-then-use
            r"\\pgfmathparse\{[^{}\n]*\}[ \t]*(?:\\pgfmathresult\b)?",
            r"\\pgfmathresult\b",
        ]
        .map(|pattern| Regex::new(pattern).expect("hazard pattern is valid"))
    })
}

/// Deletes until no pattern matches. Nested constructs such as
/// `\pgfmathsetseed\pgfmathsetseed{1}{1}` lose one layer per round.
fn strip_hazardous_constructs(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let mut changed = false;
        for pattern in hazard_patterns() {
            if pattern.is_match(&current) {
                current = pattern.replace_all(&current, "").into_owned();
                changed = true;
            }
        }
        if !changed {
            return current;
        }
    }
}

// ---------------------------------------------------------------------------
// Region balance
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Marker<'a> {
    start: usize,
    end: usize,
    opens: bool,
    name: &'a str,
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\\(begin|end)\{([A-Za-z@]+\*?)\}").expect("marker pattern is valid")
    })
}

/// Region markers in document order, excluding the document region and
/// anything behind a `%` comment.
fn scan_markers(text: &str) -> Vec<Marker<'_>> {
    marker_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?.as_str();
            if name == DOCUMENT_REGION || in_comment(text, whole.start()) {
                return None;
            }
            Some(Marker {
                start: whole.start(),
                end: whole.end(),
                opens: &caps[1] == "begin",
                name,
            })
        })
        .collect()
}

fn in_comment(text: &str, pos: usize) -> bool {
    let line_start = text[..pos].rfind('\n').map_or(0, |idx| idx + 1);
    let mut escaped = false;
    for c in text[line_start..pos].chars() {
        match c {
            '\\' => escaped = !escaped,
            '%' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

/// Match markers with a stack of open indices. Returns the indices still
/// open at the end and the indices of closes that did not match the top.
fn match_markers(markers: &[Marker<'_>]) -> (Vec<usize>, Vec<usize>) {
    let mut stack: Vec<usize> = Vec::new();
    let mut stray = Vec::new();
    for (idx, marker) in markers.iter().enumerate() {
        if marker.opens {
            stack.push(idx);
        } else if stack.last().is_some_and(|&top| markers[top].name == marker.name) {
            stack.pop();
        } else {
            stray.push(idx);
        }
    }
    (stack, stray)
}

fn balance_regions(text: &str) -> String {
    let markers = scan_markers(text);
    let (open, stray) = match_markers(&markers);
    if open.is_empty() && stray.is_empty() {
        return text.to_string();
    }
    debug!(
        synthesized = open.len(),
        removed = stray.len(),
        "rebalanced structural regions"
    );

    let mut closes = String::new();
    for &idx in open.iter().rev() {
        closes.push_str(&format!("\\end{{{}}}\n", markers[idx].name));
    }

    let insert_at = text.rfind(DOCUMENT_END).unwrap_or(text.len());
    let mut out = String::with_capacity(text.len() + closes.len() + 1);
    let mut cursor = 0;
    let mut inserted = false;

    let insert_closes = |out: &mut String, cursor: &mut usize| {
        out.push_str(&text[*cursor..insert_at]);
        if !closes.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&closes);
        }
        *cursor = insert_at;
    };

    for &idx in &stray {
        let marker = &markers[idx];
        if !inserted && marker.start >= insert_at {
            insert_closes(&mut out, &mut cursor);
            inserted = true;
        }
        out.push_str(&text[cursor..marker.start]);
        cursor = marker.end;
    }
    if !inserted {
        insert_closes(&mut out, &mut cursor);
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(inner: &str) -> String {
        format!("{DOCUMENT_BEGIN}\n{inner}\n{DOCUMENT_END}")
    }

    #[test]
    fn test_strips_code_fences() {
        let raw = "```latex\n\\begin{document}\nHello\n\\end{document}\n```";
        assert_eq!(sanitize(raw), body("Hello"));
    }

    #[test]
    fn test_crops_preamble_and_trailing_text() {
        let raw = "\\documentclass{article}\n\\begin{document}\nHi\n\\end{document}\nThanks!";
        assert_eq!(sanitize(raw), body("Hi"));
    }

    #[test]
    fn test_appends_missing_document_end() {
        let out = sanitize("\\begin{document}\nTruncated text");
        assert_eq!(out, body("Truncated text"));
    }

    #[test]
    fn test_synthesizes_document_begin() {
        let out = sanitize("Just a paragraph.");
        assert_eq!(out, body("Just a paragraph."));
    }

    #[test]
    fn test_empty_input_yields_empty_document() {
        assert_eq!(sanitize(""), format!("{DOCUMENT_BEGIN}\n\n{DOCUMENT_END}"));
    }

    #[test]
    fn test_removes_emoji_and_joiners() {
        let out = sanitize("\\begin{document}\nDone ✅ 🎉👍🏽 ok\u{200D}\n\\end{document}");
        assert_eq!(out, body("Done   ok"));
    }

    #[test]
    fn test_keeps_accented_text() {
        let out = sanitize("\\begin{document}\nAtividade de revisão: ação\n\\end{document}");
        assert!(out.contains("revisão: ação"));
    }

    #[test]
    fn test_removes_hazardous_constructs() {
        let raw = body(
            "\\pgfmathsetseed{42}\n\
             \\pgfmathrandominteger{\\a}{1}{10}\n\
             \\ifnum\\value{page}>1 Extra\\fi\n\
             Value: \\pgfmathparse{2*3}\\pgfmathresult\n\
             Kept",
        );
        let out = sanitize(&raw);
        assert!(!out.contains("pgfmath"));
        assert!(!out.contains("\\ifnum"));
        assert!(out.contains("Value: "));
        assert!(out.contains("Kept"));
    }

    #[test]
    fn test_closes_open_regions_in_reverse_order() {
        let out = sanitize("\\begin{document}\n\\begin{itemize}\n\\begin{enumerate}\n\\item a");
        let itemize_end = out.find("\\end{itemize}").expect("itemize closed");
        let enumerate_end = out.find("\\end{enumerate}").expect("enumerate closed");
        assert!(enumerate_end < itemize_end);
        assert!(out.ends_with(DOCUMENT_END));
        assert!(unclosed_regions(&out).is_empty());
    }

    #[test]
    fn test_removes_stray_close() {
        let out = sanitize(&body("\\begin{center}\nX\n\\end{tabular}\n\\end{center}"));
        assert_eq!(out, body("\\begin{center}\nX\n\n\\end{center}"));
    }

    #[test]
    fn test_mismatched_close_keeps_stack() {
        let out = sanitize(&body("\\begin{a}\\begin{b}\\end{a} text"));
        assert!(unclosed_regions(&out).is_empty());
        assert!(out.contains("\\begin{a}\\begin{b} text\n\\end{b}\n\\end{a}\n"));
    }

    #[test]
    fn test_ignores_commented_markers() {
        let raw = body("% \\begin{figure}\nText 50\\% off \\begin{center}x\\end{center}");
        let out = sanitize(&raw);
        assert!(!out.contains("\\end{figure}"));
        assert_eq!(out, raw);
    }

    #[test]
    fn test_starred_environments() {
        let out = sanitize(&body("\\begin{align*}\nx &= 1"));
        assert!(out.contains("\\end{align*}"));
    }

    #[test]
    fn test_idempotent_on_assorted_inputs() {
        let inputs = [
            "",
            "```",
            "```tex\n```",
            "\\end{document}",
            "\\end{document}\\begin{document}",
            "\\begin{document}\\begin{document}\\end{document}",
            "\\begin{itemize}\\item 🚀 go\\end{enumerate}",
            "\\pgfmath🙂parse{1}x",
            "\\begin{x}%\\end{x}\n\\end{y}",
            "plain text with } and { braces",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {input:?}");
            assert!(unclosed_regions(&once).is_empty(), "input {input:?}");
        }
    }

    #[test]
    fn test_nested_hazards_removed_in_one_call() {
        let raw = body(&format!("{}{}", "\\pgfmathsetseed".repeat(6), "{1}".repeat(6)));
        let out = sanitize(&raw);
        assert_eq!(out, body(""));
        assert_eq!(sanitize(&out), out);
    }

    #[test]
    fn test_fragment_is_cleaned_and_balanced() {
        let out = sanitize_fragment("\\begin{flushright}Prof. Ana 🖊\\end{document}");
        assert_eq!(out, "\\begin{flushright}Prof. Ana \n\\end{flushright}");
        assert!(unclosed_regions(&out).is_empty());
        assert_eq!(sanitize_fragment(&out), out);
    }

    #[test]
    fn test_unclosed_regions_reports_open_order() {
        let text = "\\begin{a}\\begin{b}\\begin{c}\\end{c}";
        assert_eq!(unclosed_regions(text), vec!["a".to_string(), "b".to_string()]);
    }
}
