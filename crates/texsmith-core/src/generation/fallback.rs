//! Credential fallback around every generation call.

use tracing::{info, warn};

use super::{Completion, CompletionCall, Credential, GenerationError, TextGenerator};
use crate::config::ServiceConfig;
use crate::domain::FallbackCredential;

/// Ordered credentials for one request: the service credential, then the
/// caller's fallback.
///
/// The fallback is tried at most once per call, and only after the primary
/// fails with a credit-exhaustion error (or when the primary is unusable).
#[derive(Debug, Clone)]
pub struct CredentialChain {
    primary: Credential,
    fallback: Option<Credential>,
}

impl CredentialChain {
    pub fn new(primary: Credential, fallback: Option<Credential>) -> Self {
        Self { primary, fallback }
    }

    /// Build the chain for a request. A fallback without its own model uses
    /// the service default.
    pub fn for_request(config: &ServiceConfig, fallback: Option<&FallbackCredential>) -> Self {
        let generation = &config.generation;
        let primary = Credential::new(generation.api_key.clone(), generation.model.clone());
        let fallback = fallback.map(|fb| {
            Credential::new(
                fb.api_key.clone(),
                fb.model.clone().unwrap_or_else(|| generation.model.clone()),
            )
        });
        Self::new(primary, fallback)
    }

    /// Model reported before any call has resolved one.
    pub fn primary_model(&self) -> &str {
        if self.primary.is_usable() {
            &self.primary.model
        } else {
            self.usable_fallback()
                .map_or(self.primary.model.as_str(), |fb| fb.model.as_str())
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.usable_fallback().is_some()
    }

    fn usable_fallback(&self) -> Option<&Credential> {
        self.fallback.as_ref().filter(|c| c.is_usable())
    }

    /// Run one generation call through the chain.
    pub async fn complete(
        &self,
        generator: &dyn TextGenerator,
        call: &CompletionCall<'_>,
    ) -> Result<Completion, GenerationError> {
        if !self.primary.is_usable() {
            let fallback = self.usable_fallback().ok_or(GenerationError::NoCredential)?;
            info!(model = %fallback.model, "service credential unset; using fallback credential");
            return generator.complete(fallback, call).await;
        }

        match generator.complete(&self.primary, call).await {
            Ok(completion) => Ok(completion),
            Err(err) if err.is_credit_exhaustion() => match self.usable_fallback() {
                Some(fallback) => {
                    warn!(
                        primary_model = %self.primary.model,
                        fallback_model = %fallback.model,
                        "service credential out of credit; retrying with fallback"
                    );
                    generator.complete(fallback, call).await
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}
