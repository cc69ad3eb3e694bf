//! Process-backed compiler: runs the engine twice inside a scratch directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::log::{extract_diagnostic, extract_warnings};
use super::{
    enable_images, is_reserved_file_name, CompileFailureKind, CompileOutcome, CompiledArtifact,
    DocumentCompiler, ImagePayloads, ARTIFACT_MISSING_DIAGNOSTIC,
};

/// First pass resolves references, second renders them.
pub const ENGINE_PASSES: u32 = 2;

const SOURCE_FILE: &str = "document.tex";
const PDF_FILE: &str = "document.pdf";
const LOG_FILE: &str = "document.log";
const SCRATCH_PREFIX: &str = "latex_";

/// Configuration for the typesetting engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Engine executable, looked up on `PATH` when not absolute.
    pub program: String,

    /// Wall-clock limit for a single pass, in seconds.
    pub timeout_secs: u64,

    /// Parent directory for per-call scratch directories
    /// (system temp dir when `None`).
    pub scratch_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "pdflatex".to_string(),
            timeout_secs: 60,
            scratch_root: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Runs `pdflatex -interaction=nonstopmode -halt-on-error` in a scratch
/// directory owned by a single call.
///
/// The scratch directory is removed on every exit path, including
/// unwinding, so repeated or concurrent calls never see each other's files.
#[derive(Debug, Clone)]
pub struct PdfLatexCompiler {
    config: EngineConfig,
}

impl PdfLatexCompiler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn compile_in(
        &self,
        dir: &Path,
        source: &str,
        images: &ImagePayloads,
    ) -> std::io::Result<CompileOutcome> {
        if let Some(name) = images.keys().find(|name| is_reserved_file_name(name)) {
            warn!(image = %name, "image name collides with the engine job files");
            return Ok(CompileOutcome::failure(
                CompileFailureKind::Io,
                format!("Image name {name:?} is reserved for the engine's job files"),
            ));
        }
        for (name, bytes) in images {
            tokio::fs::write(dir.join(name), bytes).await?;
        }
        tokio::fs::write(dir.join(SOURCE_FILE), enable_images(source, images).as_bytes()).await?;

        for pass in 1..=ENGINE_PASSES {
            let Some(output) = self.run_pass(dir).await? else {
                warn!(pass, limit_secs = self.config.timeout_secs, "engine pass timed out");
                return Ok(CompileOutcome::failure(
                    CompileFailureKind::Timeout,
                    format!(
                        "Compilation timed out ({}s limit)",
                        self.config.timeout_secs
                    ),
                ));
            };

            if !output.status.success() {
                let log = read_log(dir).await;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut diagnostic = extract_diagnostic(log.as_deref(), &stdout, &stderr);
                if diagnostic.trim().is_empty() {
                    diagnostic = format!(
                        "{} exited with {} on pass {} without output",
                        self.config.program, output.status, pass
                    );
                }
                warn!(
                    pass,
                    exit_code = output.status.code().unwrap_or(-1),
                    diagnostic_len = diagnostic.len(),
                    "engine pass failed"
                );
                return Ok(CompileOutcome::failure(CompileFailureKind::Engine, diagnostic));
            }
        }

        let pdf = match tokio::fs::read(dir.join(PDF_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("engine exited cleanly but produced no PDF");
                return Ok(CompileOutcome::failure(
                    CompileFailureKind::ArtifactMissing,
                    ARTIFACT_MISSING_DIAGNOSTIC,
                ));
            }
            Err(e) => return Err(e),
        };

        let warnings = read_log(dir)
            .await
            .map(|log| extract_warnings(&log))
            .unwrap_or_default();

        Ok(CompileOutcome::Success(CompiledArtifact::new(pdf, warnings)))
    }

    /// Run one engine pass. `Ok(None)` means the pass timed out; the child is
    /// killed when its future is dropped.
    async fn run_pass(&self, dir: &Path) -> std::io::Result<Option<Output>> {
        let child = Command::new(&self.config.program)
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-output-directory")
            .arg(dir)
            .arg(dir.join(SOURCE_FILE))
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(output) => Ok(Some(output?)),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[async_trait]
impl DocumentCompiler for PdfLatexCompiler {
    #[instrument(skip_all, fields(source_len = source.len(), images = images.len()))]
    async fn compile(&self, source: &str, images: &ImagePayloads) -> CompileOutcome {
        let start = Instant::now();

        let scratch = match self.scratch_dir() {
            Ok(dir) => dir,
            Err(e) => {
                return CompileOutcome::failure(
                    CompileFailureKind::Io,
                    format!("failed to create scratch directory: {e}"),
                )
            }
        };

        let outcome = match self.compile_in(scratch.path(), source, images).await {
            Ok(outcome) => outcome,
            Err(e) => CompileOutcome::failure(CompileFailureKind::Io, format!("Server error: {e}")),
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(path = %scratch_path.display(), error = %e, "failed to remove scratch directory");
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = outcome.is_success(),
            "compile finished"
        );
        outcome
    }
}

async fn read_log(dir: &Path) -> Option<String> {
    tokio::fs::read(dir.join(LOG_FILE))
        .await
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
