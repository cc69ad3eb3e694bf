//! Synchronous and deferred delivery of pipeline results.
//!
//! A request without a callback runs inline and its result is returned.
//! A request with one is acknowledged immediately; a detached task runs the
//! pipeline once a concurrency permit is free and POSTs the result once.
//! There is no status interface and no cancellation.

pub mod callback;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::{GenerationRequest, PipelineResult};
use crate::pipeline::Pipeline;

pub use callback::{CallbackError, CallbackSink, HttpCallbackSink};

pub const ACCEPTED_STATUS: &str = "accepted";

/// Returned right away for deferred requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Acknowledgement {
    pub status: String,
    pub delivery_id: String,
}

impl Acknowledgement {
    pub fn accepted(delivery_id: impl Into<String>) -> Self {
        Self {
            status: ACCEPTED_STATUS.to_string(),
            delivery_id: delivery_id.into(),
        }
    }
}

/// What a caller gets back from [`Dispatcher::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The pipeline ran inline.
    Completed(PipelineResult),
    /// The pipeline was scheduled; the result goes to the callback target.
    Accepted(Acknowledgement),
}

impl Submission {
    pub fn delivery_id(&self) -> &str {
        match self {
            Submission::Completed(result) => &result.delivery_id,
            Submission::Accepted(ack) => &ack.delivery_id,
        }
    }
}

/// Routes requests to inline execution or deferred delivery.
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn CallbackSink>,
    permits: Arc<Semaphore>,
    outstanding: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Deferred concurrency comes from the pipeline's delivery config.
    pub fn new(pipeline: Arc<Pipeline>, sink: Arc<dyn CallbackSink>) -> Self {
        let max_jobs = pipeline.config().delivery.max_concurrent_jobs.max(1);
        Self {
            pipeline,
            sink,
            permits: Arc::new(Semaphore::new(max_jobs)),
            outstanding: Mutex::new(Vec::new()),
        }
    }

    /// Submit a request. Requests without a delivery id get a UUID v4.
    ///
    /// A request whose callback target is invalid runs inline so the caller
    /// sees the validation failure instead of silence.
    pub async fn submit(&self, mut request: GenerationRequest) -> Submission {
        let delivery_id = request
            .delivery_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let Some(target) = request.callback.clone() else {
            return Submission::Completed(self.pipeline.run(&request).await);
        };
        if let Err(err) = target.validate() {
            warn!(delivery_id = %delivery_id, error = %err, "invalid callback target; running inline");
            return Submission::Completed(self.pipeline.run(&request).await);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let sink = Arc::clone(&self.sink);
        let permits = Arc::clone(&self.permits);
        let span = info_span!("deferred", delivery_id = %delivery_id);

        let handle = tokio::spawn(
            async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = pipeline.run(&request).await;
                match sink.deliver(&target, &result).await {
                    Ok(()) => info!(success = result.success, "result delivered"),
                    Err(err) => warn!(error = %err, url = %target.url, "callback delivery failed"),
                }
            }
            .instrument(span),
        );
        self.track(handle).await;

        info!(delivery_id = %delivery_id, "request accepted for deferred delivery");
        Submission::Accepted(Acknowledgement::accepted(delivery_id))
    }

    /// Deferred jobs scheduled and not yet finished.
    pub async fn outstanding(&self) -> usize {
        let mut outstanding = self.outstanding.lock().await;
        outstanding.retain(|handle| !handle.is_finished());
        outstanding.len()
    }

    /// Wait for every deferred job scheduled so far, including jobs
    /// submitted while draining.
    pub async fn drain(&self) {
        loop {
            let handles = std::mem::take(&mut *self.outstanding.lock().await);
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!(error = %err, "deferred job ended abnormally");
                }
            }
        }
    }

    async fn track(&self, handle: JoinHandle<()>) {
        let mut outstanding = self.outstanding.lock().await;
        outstanding.retain(|handle| !handle.is_finished());
        outstanding.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgement_serializes() {
        let ack = Acknowledgement::accepted("job-7");
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json, serde_json::json!({"status": "accepted", "delivery_id": "job-7"}));
    }
}
