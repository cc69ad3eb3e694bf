//! Mutable per-request state threaded through the repair and warning loops.

/// Owned by exactly one pipeline run and discarded once a result exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    /// Current candidate body, `\begin{document}` .. `\end{document}`.
    /// Always sanitized, hence structurally balanced.
    pub body: String,
    /// Error-repair compile invocations so far.
    pub attempts: u32,
    /// Warning-triage recompilations so far.
    pub warning_passes: u32,
    /// Model reported by the generation service for the latest reply.
    pub model: String,
    pub last_diagnostic: Option<String>,
}

impl PipelineState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            body: String::new(),
            attempts: 0,
            warning_passes: 0,
            model: model.into(),
            last_diagnostic: None,
        }
    }
}
