//! Warning triage after a successful compile.
//!
//! Only a recompile that succeeds replaces the best artifact; a failed patch
//! or a failed generation call ends triage with the previous artifact.

use tracing::{debug, info, warn};

use super::{LoopContext, MAX_WARNING_PASSES, REPAIR_TEMPERATURE};
use crate::compiler::{CompileOutcome, CompiledArtifact};
use crate::domain::PipelineState;
use crate::generation::prompts::{warning_message, WARNING_INSTRUCTIONS};

/// Substrings of warnings that are noise, not layout problems.
pub const BENIGN_WARNING_MARKERS: &[&str] = &[
    "Rerun to get",
    "Label(s) may have changed",
    "multiply defined",
    "multiply-defined",
    "destination with the same identifier",
];

/// Warnings worth an automated repair pass.
pub fn significant_warnings(warnings: &[String]) -> Vec<String> {
    warnings
        .iter()
        .filter(|w| !BENIGN_WARNING_MARKERS.iter().any(|marker| w.contains(marker)))
        .cloned()
        .collect()
}

pub(crate) async fn run_warning_triage(
    ctx: &LoopContext<'_>,
    state: &mut PipelineState,
    source: String,
    artifact: CompiledArtifact,
) -> (String, CompiledArtifact) {
    let mut best_source = source;
    let mut best = artifact;

    while state.warning_passes < MAX_WARNING_PASSES {
        let significant = significant_warnings(&best.warnings);
        if significant.is_empty() {
            debug!(total = best.warnings.len(), "no significant warnings");
            break;
        }

        let message = warning_message(&significant, &state.body, ctx.preamble_lines());
        let reply = match ctx
            .generate(WARNING_INSTRUCTIONS, &message, REPAIR_TEMPERATURE)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "warning patch call failed; keeping current artifact");
                break;
            }
        };

        let candidate_body = ctx.prepare_body(&reply.text);
        let candidate_source = ctx.source_for(&candidate_body);
        state.warning_passes += 1;

        match ctx.compiler.compile(&candidate_source, &ctx.images).await {
            CompileOutcome::Success(candidate) => {
                info!(
                    pass = state.warning_passes,
                    before = significant.len(),
                    after = significant_warnings(&candidate.warnings).len(),
                    "warning patch adopted"
                );
                state.body = candidate_body;
                state.model = reply.model;
                best_source = candidate_source;
                best = candidate;
            }
            CompileOutcome::Failure(failure) => {
                warn!(
                    pass = state.warning_passes,
                    kind = ?failure.kind,
                    "warning patch broke compilation; keeping previous artifact"
                );
                break;
            }
        }
    }

    (best_source, best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_benign_warnings() {
        let warnings = vec![
            "Overfull \\hbox (15.0pt too wide) in paragraph at lines 3--4".to_string(),
            "LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right."
                .to_string(),
            "LaTeX Warning: Label `sec:1' multiply defined.".to_string(),
            "Package hyperref Warning: destination with the same identifier (name{page.1}) has been already used".to_string(),
        ];
        assert_eq!(
            significant_warnings(&warnings),
            vec!["Overfull \\hbox (15.0pt too wide) in paragraph at lines 3--4".to_string()]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(significant_warnings(&[]).is_empty());
    }
}
