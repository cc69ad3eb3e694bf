//! Static service configuration, read once at startup.
//!
//! Everything has a default except the service credential. Reads:
//! - TEXSMITH_API_KEY (service credential, empty when unset)
//! - TEXSMITH_MODEL (default: "claude-sonnet-4-20250514")
//! - TEXSMITH_API_URL (default: "https://api.anthropic.com")
//! - TEXSMITH_API_VERSION (default: "2023-06-01")
//! - TEXSMITH_TEMPERATURE (default: 0.7)
//! - TEXSMITH_HTTP_TIMEOUT_SECS (default: 300)
//! - TEXSMITH_ENGINE (default: "pdflatex")
//! - TEXSMITH_COMPILE_TIMEOUT_SECS (default: 60)
//! - TEXSMITH_SCRATCH_DIR (default: system temp dir)
//! - TEXSMITH_MAX_IMAGES (default: 20)
//! - TEXSMITH_MAX_IMAGE_BYTES (default: 10485760)
//! - TEXSMITH_MAX_CONCURRENT_JOBS (default: 4)
//! - TEXSMITH_CALLBACK_TIMEOUT_SECS (default: 30)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compiler::EngineConfig;
use crate::domain::RequestLimits;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Errors while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Generation service settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Service credential. Empty means only caller fallbacks can be used.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    pub api_version: String,
    /// Temperature of the drafting call.
    pub temperature: f32,
    pub http_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: 0.7,
            http_timeout_secs: 300,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("temperature", &self.temperature)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// Deferred delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Deferred pipelines running at once; further jobs wait for a permit.
    pub max_concurrent_jobs: usize,
    pub callback_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            callback_timeout_secs: 30,
        }
    }
}

/// Immutable process-wide configuration, shared as `Arc<ServiceConfig>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub generation: GenerationConfig,
    pub engine: EngineConfig,
    pub limits: RequestLimits,
    pub delivery: DeliveryConfig,
}

impl ServiceConfig {
    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let temperature: f32 = parse(&get, "TEXSMITH_TEMPERATURE", "a number", defaults.generation.temperature)?;
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                var: "TEXSMITH_TEMPERATURE",
                expected: "between 0.0 and 1.0",
                value: temperature.to_string(),
            });
        }

        let generation = GenerationConfig {
            api_key: get("TEXSMITH_API_KEY").unwrap_or_default(),
            model: get("TEXSMITH_MODEL").unwrap_or(defaults.generation.model),
            api_url: get("TEXSMITH_API_URL").unwrap_or(defaults.generation.api_url),
            api_version: get("TEXSMITH_API_VERSION").unwrap_or(defaults.generation.api_version),
            temperature,
            http_timeout_secs: parse_positive(
                &get,
                "TEXSMITH_HTTP_TIMEOUT_SECS",
                defaults.generation.http_timeout_secs,
            )?,
        };

        let engine = EngineConfig {
            program: get("TEXSMITH_ENGINE").unwrap_or(defaults.engine.program),
            timeout_secs: parse_positive(
                &get,
                "TEXSMITH_COMPILE_TIMEOUT_SECS",
                defaults.engine.timeout_secs,
            )?,
            scratch_root: get("TEXSMITH_SCRATCH_DIR").map(PathBuf::from),
        };

        let limits = RequestLimits {
            max_images: parse(&get, "TEXSMITH_MAX_IMAGES", "an integer", defaults.limits.max_images)?,
            max_image_bytes: parse(
                &get,
                "TEXSMITH_MAX_IMAGE_BYTES",
                "an integer",
                defaults.limits.max_image_bytes,
            )?,
        };

        let delivery = DeliveryConfig {
            max_concurrent_jobs: parse_positive(
                &get,
                "TEXSMITH_MAX_CONCURRENT_JOBS",
                defaults.delivery.max_concurrent_jobs as u64,
            )? as usize,
            callback_timeout_secs: parse_positive(
                &get,
                "TEXSMITH_CALLBACK_TIMEOUT_SECS",
                defaults.delivery.callback_timeout_secs,
            )?,
        };

        Ok(Self {
            generation,
            engine,
            limits,
            delivery,
        })
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.limits
    }

    pub fn has_service_credential(&self) -> bool {
        !self.generation.api_key.trim().is_empty()
    }
}

fn parse<T, G>(get: &G, var: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value: raw,
        }),
    }
}

fn parse_positive<G>(get: &G, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value: u64 = parse(get, var, "a positive integer", default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            expected: "a positive integer",
            value: value.to_string(),
        });
    }
    Ok(value)
}
