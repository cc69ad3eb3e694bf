//! texsmith - LLM-drafted LaTeX that compiles
//!
//! Turns a natural-language document request into a PDF:
//! - Drafts a LaTeX body with a text-generation service
//! - Sanitizes it and compiles it with pdflatex in a throwaway directory
//! - Sends compiler diagnostics back for repair, within a fixed budget
//! - Patches non-fatal layout warnings without ever regressing
//! - Returns the result inline or POSTs it to a callback
//!
//! ## Key Components
//!
//! - `Pipeline`: the generate → sanitize → compile → repair state machine
//! - `PdfLatexCompiler`: process-backed `DocumentCompiler`
//! - `MessagesClient` + `CredentialChain`: generation with credit fallback
//! - `Dispatcher`: synchronous vs. deferred delivery

pub mod compiler;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod fakes;
pub mod generation;
pub mod pipeline;
pub mod sanitize;
pub mod telemetry;

pub use compiler::{
    CompileFailure, CompileFailureKind, CompileOutcome, CompiledArtifact, DocumentCompiler,
    EngineConfig, ImagePayloads, PdfLatexCompiler,
};
pub use config::{ConfigError, DeliveryConfig, GenerationConfig, ServiceConfig};
pub use delivery::{
    Acknowledgement, CallbackError, CallbackSink, Dispatcher, HttpCallbackSink, Submission,
};
pub use domain::{
    CallbackTarget, FailureKind, FallbackCredential, GenerationRequest, PipelineError,
    PipelineResult, PipelineState, RequestLimits, ValidationError,
};
pub use generation::{
    Completion, CompletionCall, Credential, CredentialChain, GenerationError, MessagesClient,
    TextGenerator,
};
pub use pipeline::{significant_warnings, Pipeline, MAX_COMPILE_ATTEMPTS, MAX_WARNING_PASSES};
pub use sanitize::{sanitize, sanitize_fragment, unclosed_regions};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
