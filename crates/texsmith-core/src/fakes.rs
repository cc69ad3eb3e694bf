//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedGenerator`, `ScriptedCompiler`, and
//! `RecordingCallbackSink`, which replay queued responses and record what
//! they were asked to do.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::compiler::{
    CompileFailureKind, CompileOutcome, CompiledArtifact, DocumentCompiler, ImagePayloads,
};
use crate::delivery::{CallbackError, CallbackSink};
use crate::domain::{CallbackTarget, PipelineResult};
use crate::generation::{Completion, CompletionCall, Credential, GenerationError, TextGenerator};

/// Bytes returned by [`ScriptedCompiler`] successes.
pub const FAKE_PDF: &[u8] = b"%PDF-1.5\n%fake\n";

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// One call received by [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub api_key: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Generator that replays queued replies in order. The reply's model is the
/// credential's model. An empty queue yields a transport error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: GenerationError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn models_used(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.model.clone())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        credential: &Credential,
        call: &CompletionCall<'_>,
    ) -> Result<Completion, GenerationError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: credential.model.clone(),
            api_key: credential.api_key.clone(),
            system: call.system.to_string(),
            user: call.user.to_string(),
            max_tokens: call.max_tokens,
            temperature: call.temperature,
        });

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(text)) => Ok(Completion {
                text,
                model: credential.model.clone(),
            }),
            Some(Err(err)) => Err(err),
            None => Err(GenerationError::Transport("generation script exhausted".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompiler
// ---------------------------------------------------------------------------

/// Compiler that replays queued outcomes and records every source it is
/// given. An empty queue yields an `Io` failure.
#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    outcomes: Mutex<VecDeque<CompileOutcome>>,
    sources: Mutex<Vec<String>>,
}

impl ScriptedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: CompileOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn push_success(&self, warnings: &[&str]) {
        let warnings = warnings.iter().map(|w| w.to_string()).collect();
        self.push(CompileOutcome::Success(CompiledArtifact::new(
            FAKE_PDF.to_vec(),
            warnings,
        )));
    }

    pub fn push_failure(&self, diagnostic: &str) {
        self.push(CompileOutcome::failure(CompileFailureKind::Engine, diagnostic));
    }

    pub fn compiled_sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.sources.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentCompiler for ScriptedCompiler {
    async fn compile(&self, source: &str, _images: &ImagePayloads) -> CompileOutcome {
        self.sources.lock().unwrap().push(source.to_string());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        outcome.unwrap_or_else(|| {
            CompileOutcome::failure(CompileFailureKind::Io, "compile script exhausted")
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingCallbackSink
// ---------------------------------------------------------------------------

/// Sink that records deliveries and lets tests wait for them.
#[derive(Debug)]
pub struct RecordingCallbackSink {
    deliveries: Mutex<Vec<(CallbackTarget, PipelineResult)>>,
    delivered: watch::Sender<usize>,
    fail_with: Option<CallbackError>,
}

impl Default for RecordingCallbackSink {
    fn default() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            delivered: watch::channel(0).0,
            fail_with: None,
        }
    }
}

impl RecordingCallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records each delivery and then reports `error`.
    pub fn failing(error: CallbackError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<(CallbackTarget, PipelineResult)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Wait until at least `count` deliveries happened. Returns `false` on
    /// timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.delivered.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|n| *n >= count))
            .await
            .is_ok_and(|res| res.is_ok());
        reached
    }
}

#[async_trait]
impl CallbackSink for RecordingCallbackSink {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        result: &PipelineResult,
    ) -> Result<(), CallbackError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((target.clone(), result.clone()));
        self.delivered.send_modify(|n| *n += 1);
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}
