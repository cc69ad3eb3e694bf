//! Property-style checks for the sanitizer over a corpus of realistic and
//! hostile generation outputs.

use texsmith_core::sanitize::{DOCUMENT_BEGIN, DOCUMENT_END};
use texsmith_core::{sanitize, unclosed_regions};

fn corpus() -> Vec<String> {
    let mut inputs: Vec<String> = vec![
        String::new(),
        "   \n\t ".to_string(),
        "```latex\n\\begin{document}\n\\section{Intro}\nText\n\\end{document}\n```".to_string(),
        "Here is your document:\n\\begin{document}\nBody\n\\end{document}\nLet me know!".to_string(),
        "\\begin{document}\n\\begin{tcolorbox}[title=Atividade 1 ⭐]\n\\begin{enumerate}\n\\item Quanto é 1/2 + 1/4?"
            .to_string(),
        "\\begin{document}\n\\begin{tabular}{|l|l|}\na & b \\\\\n\\end{tabular}\n\\end{tabular}\n\\end{document}"
            .to_string(),
        "\\begin{document}\\begin{center}\\begin{minipage}{0.5\\textwidth}x\\end{center}".to_string(),
        "\\begin{document}\n\\foreach \\i in {1,...,5}{\\pgfmathrandominteger{\\n}{1}{9}\\n}\n\\end{document}"
            .to_string(),
        "\\begin{document}\n\\ifnum\\thepage>1\\newpage\\fi\n\\pgfmathparse{3+4}Total: \\pgfmathresult\n\\end{document}"
            .to_string(),
        "% \\begin{itemize}\n\\end{itemize}\n\\end{document}".to_string(),
        "\\end{document}\n\\begin{document}\n\\begin{quote}".to_string(),
        "✅🎯📚 only emoji 👩‍🏫".to_string(),
        "\\begin{document}\\begin{document}\\begin{a}\\end{document}\\end{document}".to_string(),
        "\\begin{itemize*}\\begin{align*}x\\end{itemize*}".to_string(),
    ];

    // nested hazards, one layer exposed per deletion
    for depth in [2, 6, 12] {
        inputs.push(format!(
            "{DOCUMENT_BEGIN}\nBefore {}{} after",
            "\\pgfmathsetseed".repeat(depth),
            "{1}".repeat(depth)
        ));
        inputs.push(format!(
            "{DOCUMENT_BEGIN}{}x{}",
            "\\pgfmathparse{".repeat(depth),
            "}".repeat(depth)
        ));
    }

    // nested opens of increasing depth, never closed
    for depth in 1..6 {
        let mut s = String::from(DOCUMENT_BEGIN);
        for level in 0..depth {
            s.push_str(&format!("\\begin{{env{}}}", ['a', 'b', 'c', 'd', 'e'][level]));
        }
        inputs.push(s);
    }
    inputs
}

/// Test: sanitize(sanitize(x)) == sanitize(x)
#[test]
fn test_sanitize_is_idempotent() {
    for input in corpus() {
        let once = sanitize(&input);
        let twice = sanitize(&once);
        assert_eq!(once, twice, "not idempotent for {input:?}");
    }
}

/// Test: no region stays open after sanitization
#[test]
fn test_output_is_structurally_closed() {
    for input in corpus() {
        let out = sanitize(&input);
        assert!(
            unclosed_regions(&out).is_empty(),
            "unclosed regions {:?} in {out:?}",
            unclosed_regions(&out)
        );
        assert!(out.starts_with(DOCUMENT_BEGIN), "{out:?}");
        assert!(out.ends_with(DOCUMENT_END), "{out:?}");
        assert_eq!(out.matches(DOCUMENT_END).count(), 1, "{out:?}");
    }
}

/// Test: no hazardous construct survives, however deeply nested
#[test]
fn test_output_has_no_hazards() {
    for input in corpus() {
        let out = sanitize(&input);
        assert!(!out.contains("\\pgfmathsetseed{"), "{out:?}");
        assert!(!out.contains("\\pgfmathresult"), "{out:?}");
    }
}

/// Test: emoji never survive
#[test]
fn test_output_has_no_pictographs() {
    for input in corpus() {
        let out = sanitize(&input);
        assert!(
            !out.chars().any(|c| matches!(c as u32, 0x1F000..=0x1FAFF | 0x2600..=0x27BF)),
            "{out:?}"
        );
    }
}

/// Test: a source missing its final closer gains one
#[test]
fn test_missing_final_closer_is_synthesized() {
    let out = sanitize("\\begin{document}\n\\section{Resumo}\nConteúdo");
    assert_eq!(out, "\\begin{document}\n\\section{Resumo}\nConteúdo\n\\end{document}");
}

/// Test: synthesized closes are placed last-opened first, before the document end
#[test]
fn test_closes_in_reverse_open_order() {
    let out = sanitize("\\begin{document}\\begin{enva}\\begin{envb}\\begin{envc}");
    assert!(out.ends_with("\\end{envc}\n\\end{envb}\n\\end{enva}\n\\end{document}"), "{out:?}");
}
