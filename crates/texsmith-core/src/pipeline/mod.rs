//! Generate → sanitize → compile → repair orchestration.
//!
//! A run drafts a body, drives the [`repair`] loop until a compile succeeds
//! or the attempt budget runs out, then hands a successful artifact to
//! [`warnings`] triage. Every outcome, including invalid input and
//! generation failures, ends as a [`PipelineResult`].

pub mod repair;
pub mod warnings;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::compiler::{CompiledArtifact, DocumentCompiler, ImagePayloads, PdfLatexCompiler};
use crate::config::ServiceConfig;
use crate::domain::{GenerationRequest, PipelineError, PipelineResult, PipelineState};
use crate::generation::{
    Completion, CompletionCall, CredentialChain, GenerationError, MessagesClient, TextGenerator,
};
use crate::sanitize::{sanitize, sanitize_fragment, DOCUMENT_END};

pub use warnings::significant_warnings;

/// Error-repair compile invocations per request.
pub const MAX_COMPILE_ATTEMPTS: u32 = 5;

/// Warning-triage recompilations per request.
pub const MAX_WARNING_PASSES: u32 = 2;

/// Temperature of repair and warning-triage calls.
pub const REPAIR_TEMPERATURE: f32 = 0.2;

/// Runs requests against a generation service and a typesetting engine.
///
/// Holds only read-only collaborators; all per-request state lives in a
/// [`PipelineState`] created by [`Pipeline::run`].
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<ServiceConfig>,
    generator: Arc<dyn TextGenerator>,
    compiler: Arc<dyn DocumentCompiler>,
}

impl Pipeline {
    pub fn new(
        config: Arc<ServiceConfig>,
        generator: Arc<dyn TextGenerator>,
        compiler: Arc<dyn DocumentCompiler>,
    ) -> Self {
        Self {
            config,
            generator,
            compiler,
        }
    }

    /// Wire the HTTP generation client and the process-backed compiler.
    pub fn from_config(config: Arc<ServiceConfig>) -> Result<Self, GenerationError> {
        let generator = MessagesClient::new(&config.generation)?;
        let compiler = PdfLatexCompiler::new(config.engine.clone());
        Ok(Self::new(config, Arc::new(generator), Arc::new(compiler)))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run one request to completion. Never fails: errors become a result
    /// with `success == false`.
    pub async fn run(&self, request: &GenerationRequest) -> PipelineResult {
        let delivery_id = request
            .delivery_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let span = info_span!("pipeline", delivery_id = %delivery_id);
        self.run_with_id(request, delivery_id).instrument(span).await
    }

    async fn run_with_id(&self, request: &GenerationRequest, delivery_id: String) -> PipelineResult {
        let start = Instant::now();
        let chain = CredentialChain::for_request(&self.config, request.fallback.as_ref());
        let mut state = PipelineState::new(chain.primary_model());

        let images = match request.validate(self.config.limits()) {
            Ok(images) => images,
            Err(err) => {
                warn!(error = %err, "rejecting invalid request");
                return PipelineResult::failed(delivery_id, &state, None, &PipelineError::from(err));
            }
        };

        let ctx = LoopContext {
            generator: self.generator.as_ref(),
            compiler: self.compiler.as_ref(),
            chain,
            request,
            images,
        };

        let result = match self.execute(&ctx, &mut state).await {
            Ok((source, artifact)) => PipelineResult::succeeded(delivery_id, &state, source, artifact),
            Err(err) => {
                let last_source =
                    (!state.body.is_empty()).then(|| ctx.source_for(&state.body));
                PipelineResult::failed(delivery_id, &state, last_source, &err)
            }
        };

        info!(
            success = result.success,
            attempts = result.attempts,
            warning_passes = result.warning_passes,
            model = %result.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        result
    }

    async fn execute(
        &self,
        ctx: &LoopContext<'_>,
        state: &mut PipelineState,
    ) -> Result<(String, CompiledArtifact), PipelineError> {
        let draft = ctx
            .generate(
                &ctx.request.system_prompt,
                &ctx.request.user_prompt,
                self.config.generation.temperature,
            )
            .await?;
        state.model = draft.model;
        state.body = ctx.prepare_body(&draft.text);
        info!(model = %state.model, body_len = state.body.len(), "draft received");

        let (source, artifact) = repair::run_repair_loop(ctx, state).await?;
        Ok(warnings::run_warning_triage(ctx, state, source, artifact).await)
    }
}

/// Collaborators and immutable inputs shared by both loops of one run.
pub(crate) struct LoopContext<'a> {
    pub(crate) generator: &'a dyn TextGenerator,
    pub(crate) compiler: &'a dyn DocumentCompiler,
    pub(crate) chain: CredentialChain,
    pub(crate) request: &'a GenerationRequest,
    pub(crate) images: ImagePayloads,
}

impl LoopContext<'_> {
    /// One generation call through the credential chain with the request's
    /// token budget.
    pub(crate) async fn generate(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<Completion, GenerationError> {
        let call = CompletionCall {
            system,
            user,
            max_tokens: self.request.max_tokens,
            temperature,
        };
        self.chain.complete(self.generator, &call).await
    }

    /// Full compilable source: the request preamble followed by `body`.
    pub(crate) fn source_for(&self, body: &str) -> String {
        assemble_source(&self.request.preamble, body)
    }

    /// Lines the preamble occupies in [`LoopContext::source_for`] output.
    pub(crate) fn preamble_lines(&self) -> usize {
        preamble_line_count(&self.request.preamble)
    }

    /// Sanitize generated text and add the request's signature block. The
    /// block is cleaned the same way, so the body stays balanced.
    pub(crate) fn prepare_body(&self, text: &str) -> String {
        let signature = self.request.signature_block.as_deref().map(sanitize_fragment);
        apply_signature(sanitize(text), signature.as_deref())
    }
}

pub fn assemble_source(preamble: &str, body: &str) -> String {
    format!("{}\n{}\n", preamble.trim_end(), body)
}

/// Number of lines ahead of the body in [`assemble_source`] output.
pub fn preamble_line_count(preamble: &str) -> usize {
    preamble.trim_end().lines().count()
}

/// Insert `signature` right before the last `\end{document}` unless the body
/// already contains it.
pub fn apply_signature(body: String, signature: Option<&str>) -> String {
    let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return body;
    };
    if body.contains(signature) {
        return body;
    }
    let at = body.rfind(DOCUMENT_END).unwrap_or(body.len());
    let (head, tail) = body.split_at(at);
    let separator = if head.is_empty() || head.ends_with('\n') { "" } else { "\n" };
    format!("{head}{separator}{signature}\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_source() {
        let source = assemble_source("\\documentclass{article}\n\n", "\\begin{document}\n\\end{document}");
        assert_eq!(
            source,
            "\\documentclass{article}\n\\begin{document}\n\\end{document}\n"
        );
    }

    #[test]
    fn test_preamble_line_count_matches_assembled_source() {
        let preamble = "\\documentclass{article}\n\\usepackage{amsmath}\n\n";
        let source = assemble_source(preamble, "\\begin{document}\n\\end{document}");
        let n = preamble_line_count(preamble);
        assert_eq!(n, 2);
        assert_eq!(source.lines().nth(n), Some("\\begin{document}"));
    }

    #[test]
    fn test_apply_signature_inserts_before_document_end() {
        let body = "\\begin{document}\nText\n\\end{document}".to_string();
        let signed = apply_signature(body, Some("\\vfill Prof. Ana\n"));
        assert_eq!(
            signed,
            "\\begin{document}\nText\n\\vfill Prof. Ana\n\\end{document}"
        );
    }

    #[test]
    fn test_apply_signature_is_idempotent() {
        let body = "\\begin{document}\nText\n\\end{document}".to_string();
        let once = apply_signature(body, Some("-- signed"));
        let twice = apply_signature(once.clone(), Some("-- signed"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_apply_signature_skips_blank() {
        let body = "\\begin{document}\\end{document}".to_string();
        assert_eq!(apply_signature(body.clone(), Some("  ")), body);
        assert_eq!(apply_signature(body.clone(), None), body);
    }
}
