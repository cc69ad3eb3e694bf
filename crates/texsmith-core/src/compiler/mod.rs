//! Compiler invoker: typesets a source document and classifies the outcome.
//!
//! # Modules
//!
//! - [`engine`]: `PdfLatexCompiler`, the process-backed implementation
//! - [`log`]: fatal diagnostic and warning extraction from engine logs

pub mod engine;
pub mod log;

use std::borrow::Cow;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use engine::{EngineConfig, PdfLatexCompiler};
pub use log::{extract_diagnostic, extract_warnings};

/// Decoded images written next to the source, file name to bytes.
pub type ImagePayloads = BTreeMap<String, Vec<u8>>;

/// Directive that keeps image inclusion switched off in the preamble.
pub const IMAGES_DISABLED: &str = r"\imagesfalse";
pub const IMAGES_ENABLED: &str = r"\imagestrue";

/// Base name of every file the engine reads or writes in the scratch dir.
pub const JOB_NAME: &str = "document";

pub const ARTIFACT_MISSING_DIAGNOSTIC: &str =
    "PDF was not generated (file not found after compilation)";

/// Trait for typesetting backends.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    /// Compile `source` with `images` available beside it. Never fails;
    /// every problem is reported as [`CompileOutcome::Failure`].
    async fn compile(&self, source: &str, images: &ImagePayloads) -> CompileOutcome;
}

/// A successfully typeset document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub pdf: Vec<u8>,
    pub warnings: Vec<String>,
}

impl CompiledArtifact {
    pub fn new(pdf: Vec<u8>, warnings: Vec<String>) -> Self {
        Self { pdf, warnings }
    }

    pub fn size_bytes(&self) -> usize {
        self.pdf.len()
    }
}

/// Why a compile attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileFailureKind {
    /// Non-zero engine exit; the diagnostic comes from the log.
    Engine,
    /// A pass exceeded its wall-clock limit.
    Timeout,
    /// Zero exit but no PDF in the scratch directory.
    ArtifactMissing,
    /// Scratch directory or process plumbing failed.
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    pub kind: CompileFailureKind,
    pub diagnostic: String,
}

impl CompileFailure {
    pub fn new(kind: CompileFailureKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Produced once per compiler invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Success(CompiledArtifact),
    Failure(CompileFailure),
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Success(_))
    }

    pub fn failure(kind: CompileFailureKind, diagnostic: impl Into<String>) -> Self {
        CompileOutcome::Failure(CompileFailure::new(kind, diagnostic))
    }
}

/// True for names that would collide with the engine's own job files
/// (`document.tex`, `document.pdf`, `document.log`, `document.aux`, ...).
pub fn is_reserved_file_name(name: &str) -> bool {
    name.strip_prefix(JOB_NAME)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Switch the disabled-image directive on when images are present.
pub fn enable_images<'a>(source: &'a str, images: &ImagePayloads) -> Cow<'a, str> {
    if images.is_empty() || !source.contains(IMAGES_DISABLED) {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(source.replace(IMAGES_DISABLED, IMAGES_ENABLED))
    }
}
