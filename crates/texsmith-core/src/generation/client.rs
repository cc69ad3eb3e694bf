//! HTTP client for the Messages API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Completion, CompletionCall, Credential, GenerationError, TextGenerator};
use crate::config::GenerationConfig;

const MESSAGES_PATH: &str = "/v1/messages";
const USER_AGENT: &str = concat!("texsmith/", env!("CARGO_PKG_VERSION"));

/// Messages API client. Holds no credential; each call carries its own.
#[derive(Debug, Clone)]
pub struct MessagesClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_version: String,
}

impl MessagesClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint: format!("{}{}", config.api_url.trim_end_matches('/'), MESSAGES_PATH),
            api_version: config.api_version.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for MessagesClient {
    async fn complete(
        &self,
        credential: &Credential,
        call: &CompletionCall<'_>,
    ) -> Result<Completion, GenerationError> {
        let start = Instant::now();
        let body = MessagesRequest::new(&credential.model, call);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-api-key", &credential.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = parse_error(status.as_u16(), &text);
            warn!(status = status.as_u16(), model = %credential.model, "generation call rejected");
            return Err(err);
        }

        let completion = parse_completion(&text, &credential.model)?;
        debug!(
            model = %completion.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = completion.text.len(),
            "generation call completed"
        );
        Ok(completion)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> MessagesRequest<'a> {
    fn new(model: &'a str, call: &CompletionCall<'a>) -> Self {
        Self {
            model,
            max_tokens: call.max_tokens,
            system: call.system,
            temperature: call.temperature,
            messages: [Message {
                role: "user",
                content: call.user,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    message: String,
}

fn parse_completion(body: &str, requested_model: &str) -> Result<Completion, GenerationError> {
    let response: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    if response.stop_reason.as_deref() == Some("max_tokens") {
        warn!("generation stopped at the token budget; output may be truncated");
    }

    let text: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();
    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    let model = response
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| requested_model.to_string());
    Ok(Completion { text, model })
}

fn parse_error(status: u16, body: &str) -> GenerationError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("{}: {}", kind, envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    };
    GenerationError::Api { status, message }
}
