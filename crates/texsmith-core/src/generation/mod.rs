//! Generation service seam: the trait, credentials and the error taxonomy.
//!
//! # Modules
//!
//! - [`client`]: `MessagesClient`, the HTTP implementation
//! - [`fallback`]: `CredentialChain`, credit-exhaustion fallback
//! - [`prompts`]: fixed repair and warning instruction sets

pub mod client;
pub mod fallback;
pub mod prompts;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use client::MessagesClient;
pub use fallback::CredentialChain;

/// Error text the generation service returns when the account has no credit
/// left. Matched case-insensitively.
pub const CREDIT_EXHAUSTION_SIGNATURE: &str = "credit balance is too low";

/// Trait for text-generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Issue one blocking completion call with `credential`.
    async fn complete(
        &self,
        credential: &Credential,
        call: &CompletionCall<'_>,
    ) -> Result<Completion, GenerationError>;
}

/// An API key paired with the model it should be used with.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub model: String,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// A credential with a blank key or model is skipped, not sent.
    pub fn is_usable(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.model.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// Parameters of one completion call; the model comes from the credential.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionCall<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Final text of a completion and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Errors from the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Network failure or timeout reaching the service
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("generation service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("generation service returned no text")]
    EmptyResponse,

    /// Neither the service credential nor a fallback is usable
    #[error("no usable generation credential configured")]
    NoCredential,
}

impl GenerationError {
    /// True when the failure means the credential ran out of credit, the
    /// only class that triggers credential fallback.
    pub fn is_credit_exhaustion(&self) -> bool {
        self.to_string()
            .to_lowercase()
            .contains(CREDIT_EXHAUSTION_SIGNATURE)
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Transport(err.to_string())
    }
}
