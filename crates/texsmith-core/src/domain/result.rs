//! Terminal result of a pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{FailureKind, PipelineError};
use super::state::PipelineState;
use crate::compiler::CompiledArtifact;

/// Immutable once produced. Returned to synchronous callers and posted to
/// the callback target in deferred mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub delivery_id: String,
    pub success: bool,

    /// Compiled PDF, serialized as base64.
    #[serde(
        rename = "pdf_base64",
        with = "pdf_base64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf: Option<Vec<u8>>,

    #[serde(default)]
    pub pdf_size_bytes: Option<usize>,

    /// Hex SHA-256 of the PDF bytes.
    #[serde(default)]
    pub pdf_sha256: Option<String>,

    /// Final source on success, last attempted source on failure.
    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub warnings: Vec<String>,

    /// Error-repair compile invocations consumed.
    pub attempts: u32,

    /// Warning-triage recompilations consumed.
    #[serde(default)]
    pub warning_passes: u32,

    pub model: String,

    #[serde(default)]
    pub diagnostic: Option<String>,

    #[serde(default)]
    pub failure_kind: Option<FailureKind>,

    pub finished_at: DateTime<Utc>,
}

impl PipelineResult {
    pub fn succeeded(
        delivery_id: impl Into<String>,
        state: &PipelineState,
        source: String,
        artifact: CompiledArtifact,
    ) -> Self {
        let digest = hex::encode(Sha256::digest(&artifact.pdf));
        Self {
            delivery_id: delivery_id.into(),
            success: true,
            pdf_size_bytes: Some(artifact.size_bytes()),
            pdf_sha256: Some(digest),
            pdf: Some(artifact.pdf),
            source: Some(source),
            warnings: artifact.warnings,
            attempts: state.attempts,
            warning_passes: state.warning_passes,
            model: state.model.clone(),
            diagnostic: None,
            failure_kind: None,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed result. An exhausted run reports the source it last
    /// compiled; other failures report `last_source`.
    pub fn failed(
        delivery_id: impl Into<String>,
        state: &PipelineState,
        last_source: Option<String>,
        error: &PipelineError,
    ) -> Self {
        let source = match error {
            PipelineError::Exhausted { last_source, .. } => Some(last_source.clone()),
            _ => last_source,
        };
        Self {
            delivery_id: delivery_id.into(),
            success: false,
            pdf: None,
            pdf_size_bytes: None,
            pdf_sha256: None,
            source,
            warnings: Vec::new(),
            attempts: state.attempts,
            warning_passes: state.warning_passes,
            model: state.model.clone(),
            diagnostic: Some(error.diagnostic()),
            failure_kind: Some(error.kind()),
            finished_at: Utc::now(),
        }
    }
}

mod pdf_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
