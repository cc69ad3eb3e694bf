//! Generation request: the immutable input of one pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::compiler::{is_reserved_file_name, ImagePayloads};

/// Limits applied while validating a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestLimits {
    /// Maximum number of embedded images.
    pub max_images: usize,
    /// Maximum aggregate size of the decoded images, in bytes.
    pub max_image_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_images: 20,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Where and how to deliver a deferred result.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackTarget {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: Option<String>,
}

impl fmt::Debug for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackTarget")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CallbackTarget {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.starts_with("https://") || url.starts_with("http://") {
            Ok(())
        } else {
            Err(ValidationError::InvalidCallbackUrl {
                url: self.url.clone(),
            })
        }
    }
}

/// Caller-supplied credential tried after the service credential runs out
/// of credit.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackCredential {
    pub api_key: String,
    /// Model to use with this credential; the service default when absent.
    #[serde(default)]
    pub model: Option<String>,
}

impl fmt::Debug for FallbackCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackCredential")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// A natural-language document request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    /// Instructions for the drafting call.
    pub system_prompt: String,

    /// What the document should contain.
    pub user_prompt: String,

    /// LaTeX preamble placed before every generated body.
    pub preamble: String,

    /// Token budget for every generation call of this request.
    pub max_tokens: u32,

    /// Embedded images, file name to base64 payload.
    #[serde(default)]
    pub images: BTreeMap<String, String>,

    /// Block inserted before `\end{document}` when the body lacks it.
    #[serde(default)]
    pub signature_block: Option<String>,

    /// Identifier echoed in the acknowledgement and the result.
    #[serde(default)]
    pub delivery_id: Option<String>,

    /// Present for deferred delivery.
    #[serde(default)]
    pub callback: Option<CallbackTarget>,

    #[serde(default)]
    pub fallback: Option<FallbackCredential>,
}

impl GenerationRequest {
    /// Check the request against `limits` and decode its images.
    pub fn validate(&self, limits: &RequestLimits) -> Result<ImagePayloads, ValidationError> {
        if self.system_prompt.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "system_prompt",
            });
        }
        if self.user_prompt.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "user_prompt",
            });
        }
        if self.preamble.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "preamble" });
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::ZeroTokenBudget);
        }
        if let Some(callback) = &self.callback {
            callback.validate()?;
        }
        decode_images(&self.images, limits)
    }

    pub fn is_deferred(&self) -> bool {
        self.callback.is_some()
    }
}

/// Decode base64 image payloads, enforcing name rules and size limits.
pub fn decode_images(
    encoded: &BTreeMap<String, String>,
    limits: &RequestLimits,
) -> Result<ImagePayloads, ValidationError> {
    if encoded.len() > limits.max_images {
        return Err(ValidationError::TooManyImages {
            count: encoded.len(),
            limit: limits.max_images,
        });
    }

    let mut decoded = ImagePayloads::new();
    let mut total_bytes = 0usize;
    for (name, payload) in encoded {
        if !is_bare_file_name(name) {
            return Err(ValidationError::InvalidImageName { name: name.clone() });
        }
        let bytes = STANDARD.decode(payload.trim()).map_err(|e| {
            ValidationError::InvalidImageEncoding {
                name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        total_bytes += bytes.len();
        if total_bytes > limits.max_image_bytes {
            return Err(ValidationError::ImagesTooLarge {
                total_bytes,
                limit_bytes: limits.max_image_bytes,
            });
        }
        decoded.insert(name.clone(), bytes);
    }
    Ok(decoded)
}

fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with('.')
        && !is_reserved_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You write LaTeX bodies.".to_string(),
            user_prompt: "A one-page lesson plan on fractions.".to_string(),
            preamble: "\\documentclass{article}".to_string(),
            max_tokens: 4096,
            images: BTreeMap::new(),
            signature_block: None,
            delivery_id: None,
            callback: None,
            fallback: None,
        }
    }

    #[test]
    fn test_valid_request_without_images() {
        let images = request().validate(&RequestLimits::default()).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_rejects_empty_prompt() {
        let mut req = request();
        req.user_prompt = "   ".to_string();
        assert_eq!(
            req.validate(&RequestLimits::default()),
            Err(ValidationError::EmptyField {
                field: "user_prompt"
            })
        );
    }

    #[test]
    fn test_rejects_zero_token_budget() {
        let mut req = request();
        req.max_tokens = 0;
        assert_eq!(
            req.validate(&RequestLimits::default()),
            Err(ValidationError::ZeroTokenBudget)
        );
    }

    #[test]
    fn test_decodes_images() {
        let mut req = request();
        req.images
            .insert("logo.png".to_string(), STANDARD.encode(b"\x89PNG fake"));
        let images = req.validate(&RequestLimits::default()).unwrap();
        assert_eq!(images["logo.png"], b"\x89PNG fake".to_vec());
    }

    #[test]
    fn test_rejects_path_like_image_names() {
        for name in ["../evil.png", "dir/logo.png", ".hidden", ""] {
            let mut req = request();
            req.images.insert(name.to_string(), STANDARD.encode(b"x"));
            assert!(
                matches!(
                    req.validate(&RequestLimits::default()),
                    Err(ValidationError::InvalidImageName { .. })
                ),
                "name {name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_engine_job_file_names() {
        for name in ["document.tex", "document.pdf", "document.log"] {
            let mut req = request();
            req.images
                .insert(name.to_string(), STANDARD.encode(b"NOT THE SOURCE"));
            assert_eq!(
                req.validate(&RequestLimits::default()),
                Err(ValidationError::InvalidImageName {
                    name: name.to_string()
                })
            );
        }
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let mut req = request();
        req.images
            .insert("logo.png".to_string(), "not base64!!".to_string());
        assert!(matches!(
            req.validate(&RequestLimits::default()),
            Err(ValidationError::InvalidImageEncoding { .. })
        ));
    }

    #[test]
    fn test_enforces_aggregate_image_size() {
        let limits = RequestLimits {
            max_images: 5,
            max_image_bytes: 8,
        };
        let mut req = request();
        req.images.insert("a.png".to_string(), STANDARD.encode([0u8; 5]));
        req.images.insert("b.png".to_string(), STANDARD.encode([0u8; 5]));
        assert_eq!(
            req.validate(&limits),
            Err(ValidationError::ImagesTooLarge {
                total_bytes: 10,
                limit_bytes: 8
            })
        );
    }

    #[test]
    fn test_enforces_image_count() {
        let limits = RequestLimits {
            max_images: 1,
            max_image_bytes: 1024,
        };
        let mut req = request();
        req.images.insert("a.png".to_string(), STANDARD.encode(b"a"));
        req.images.insert("b.png".to_string(), STANDARD.encode(b"b"));
        assert_eq!(
            req.validate(&limits),
            Err(ValidationError::TooManyImages { count: 2, limit: 1 })
        );
    }

    #[test]
    fn test_rejects_non_http_callback() {
        let mut req = request();
        req.callback = Some(CallbackTarget {
            url: "ftp://example.com/hook".to_string(),
            token: None,
        });
        assert!(matches!(
            req.validate(&RequestLimits::default()),
            Err(ValidationError::InvalidCallbackUrl { .. })
        ));
        assert!(req.is_deferred());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let fallback = FallbackCredential {
            api_key: "sk-secret".to_string(),
            model: None,
        };
        let target = CallbackTarget {
            url: "https://example.com/hook".to_string(),
            token: Some("hook-secret".to_string()),
        };
        assert!(!format!("{fallback:?}").contains("sk-secret"));
        assert!(!format!("{target:?}").contains("hook-secret"));
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let json = r#"{
            "system_prompt": "s",
            "user_prompt": "u",
            "preamble": "\\documentclass{article}",
            "max_tokens": 100
        }"#;
        let req: GenerationRequest = serde_json::from_str(json).expect("deserialize");
        assert!(req.images.is_empty());
        assert!(req.callback.is_none());
        assert!(!req.is_deferred());
    }
}
