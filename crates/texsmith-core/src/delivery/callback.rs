//! Callback delivery of deferred results.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::{CallbackTarget, PipelineResult};

/// Errors from a single callback POST. Logged by the dispatcher, never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("callback transport error: {0}")]
    Transport(String),

    #[error("callback endpoint returned status {status}")]
    Status { status: u16 },

    #[error("failed to build callback client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for CallbackError {
    fn from(err: reqwest::Error) -> Self {
        CallbackError::Transport(err.to_string())
    }
}

/// Trait for result delivery targets.
#[async_trait]
pub trait CallbackSink: Send + Sync {
    /// Deliver `result` to `target` once.
    async fn deliver(
        &self,
        target: &CallbackTarget,
        result: &PipelineResult,
    ) -> Result<(), CallbackError>;
}

/// POSTs the serialized result as JSON. The response body is ignored.
#[derive(Debug, Clone)]
pub struct HttpCallbackSink {
    http_client: reqwest::Client,
}

impl HttpCallbackSink {
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("texsmith/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Client(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl CallbackSink for HttpCallbackSink {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        result: &PipelineResult,
    ) -> Result<(), CallbackError> {
        let mut request = self.http_client.post(&target.url).json(result);
        if let Some(token) = target.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::Status {
                status: status.as_u16(),
            });
        }
        debug!(status = status.as_u16(), url = %target.url, "callback accepted");
        Ok(())
    }
}
