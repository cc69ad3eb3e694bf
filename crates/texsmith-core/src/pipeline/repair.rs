//! Error-repair loop: compile, and on failure ask for a fixed body.

use tracing::{info, trace, warn};

use super::{LoopContext, MAX_COMPILE_ATTEMPTS, REPAIR_TEMPERATURE};
use crate::compiler::{CompileFailure, CompileOutcome, CompiledArtifact};
use crate::domain::{PipelineError, PipelineState};
use crate::generation::prompts::{repair_message, REPAIR_INSTRUCTIONS};

/// Phase names, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPhase {
    Compiling,
    Repairing,
    Succeeded,
    ExhaustedFailed,
}

#[derive(Debug)]
enum RepairState {
    Compiling,
    Repairing(CompileFailure),
    Succeeded {
        source: String,
        artifact: CompiledArtifact,
    },
    ExhaustedFailed {
        source: String,
        failure: CompileFailure,
    },
}

impl RepairState {
    fn phase(&self) -> RepairPhase {
        match self {
            RepairState::Compiling => RepairPhase::Compiling,
            RepairState::Repairing(_) => RepairPhase::Repairing,
            RepairState::Succeeded { .. } => RepairPhase::Succeeded,
            RepairState::ExhaustedFailed { .. } => RepairPhase::ExhaustedFailed,
        }
    }
}

/// Drive `state.body` to a successful compile within
/// [`MAX_COMPILE_ATTEMPTS`] compiles.
///
/// A generation failure while repairing ends the loop immediately.
pub(crate) async fn run_repair_loop(
    ctx: &LoopContext<'_>,
    state: &mut PipelineState,
) -> Result<(String, CompiledArtifact), PipelineError> {
    let mut current = RepairState::Compiling;
    loop {
        current = match current {
            RepairState::Compiling => {
                state.attempts += 1;
                let source = ctx.source_for(&state.body);
                let outcome = ctx.compiler.compile(&source, &ctx.images).await;
                match outcome {
                    CompileOutcome::Success(artifact) => {
                        info!(attempt = state.attempts, warnings = artifact.warnings.len(), "compile succeeded");
                        RepairState::Succeeded { source, artifact }
                    }
                    CompileOutcome::Failure(failure) => {
                        warn!(
                            attempt = state.attempts,
                            kind = ?failure.kind,
                            diagnostic_len = failure.diagnostic.len(),
                            "compile failed"
                        );
                        state.last_diagnostic = Some(failure.diagnostic.clone());
                        if state.attempts >= MAX_COMPILE_ATTEMPTS {
                            RepairState::ExhaustedFailed { source, failure }
                        } else {
                            RepairState::Repairing(failure)
                        }
                    }
                }
            }
            RepairState::Repairing(failure) => {
                let message = repair_message(&failure.diagnostic, &state.body, ctx.preamble_lines());
                let reply = ctx
                    .generate(REPAIR_INSTRUCTIONS, &message, REPAIR_TEMPERATURE)
                    .await
                    .inspect_err(|err| {
                        warn!(attempt = state.attempts, error = %err, "repair call failed");
                    })?;
                state.model = reply.model;
                state.body = ctx.prepare_body(&reply.text);
                RepairState::Compiling
            }
            RepairState::Succeeded { source, artifact } => return Ok((source, artifact)),
            RepairState::ExhaustedFailed { source, failure } => {
                warn!(
                    attempts = state.attempts,
                    phase = ?RepairPhase::ExhaustedFailed,
                    "repair budget exhausted"
                );
                return Err(PipelineError::Exhausted {
                    attempts: state.attempts,
                    failure,
                    last_source: source,
                });
            }
        };
        trace!(phase = ?current.phase(), "repair transition");
    }
}
