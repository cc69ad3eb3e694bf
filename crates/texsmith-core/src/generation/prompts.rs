//! Fixed instruction sets for the repair and warning-triage calls.

/// System instructions for error repair.
pub const REPAIR_INSTRUCTIONS: &str = "\
You repair LaTeX documents that failed to compile with pdflatex.

Rules:
1. Fix only what the compiler error requires. Never change, summarize, reorder or translate the textual content.
2. If the document is truncated, complete the unfinished element (item, table row, environment) minimally and close every open environment.
3. Do not use \\pgfmathsetseed, \\pgfmathrandom, \\pgfmathparse, \\pgfmathresult, \\ifnum, \\ifdim, \\ifx or \\ifodd.
4. Do not use emoji or pictographic symbols; pdflatex cannot render them.
5. Do not add packages; the preamble is fixed and not part of your answer.
6. Return the complete body from \\begin{document} to \\end{document}, with no explanation and no code fences.";

/// System instructions for warning triage.
pub const WARNING_INSTRUCTIONS: &str = "\
You polish the layout of LaTeX documents that already compile with pdflatex.

Rules:
1. Fix only the listed formatting warnings (overfull or underfull boxes, float placement, spacing).
2. Never add, remove or reword any text. Line breaks, column widths, \\resizebox, \\small and similar adjustments are allowed.
3. Do not put tabular or tcolorbox environments inside a minipage inside another box, and do not nest tcolorbox environments.
4. Do not use \\pgfmath commands, low-level \\if conditionals or emoji.
5. Return the complete body from \\begin{document} to \\end{document}, with no explanation and no code fences.";

/// Engine line numbers count the whole file, preamble included.
fn line_offset_note(preamble_lines: usize) -> String {
    if preamble_lines == 0 {
        return String::new();
    }
    format!(
        "Line numbers in compiler output count the whole file. The fixed preamble \
         takes lines 1-{preamble_lines}, so line 1 of the body below is file line {}.\n\n",
        preamble_lines + 1
    )
}

/// User message for an error-repair call.
pub fn repair_message(diagnostic: &str, body: &str, preamble_lines: usize) -> String {
    format!(
        "The document below failed to compile.\n\n\
         Compiler error:\n```\n{diagnostic}\n```\n\n\
         {}Document body:\n{body}\n",
        line_offset_note(preamble_lines)
    )
}

/// User message for a warning-triage call.
pub fn warning_message(warnings: &[String], body: &str, preamble_lines: usize) -> String {
    let mut listed = String::new();
    for warning in warnings {
        listed.push_str("- ");
        listed.push_str(warning);
        listed.push('\n');
    }
    format!(
        "The document below compiles but produced these warnings:\n{listed}\n\
         {}Document body:\n{body}\n",
        line_offset_note(preamble_lines)
    )
}
