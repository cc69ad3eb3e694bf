//! Domain models for texsmith.
//!
//! - `GenerationRequest`: immutable input of one run
//! - `PipelineState`: mutable state owned by one run
//! - `PipelineResult`: terminal, immutable output
//! - `PipelineError` / `ValidationError`: failure taxonomy

pub mod error;
pub mod request;
pub mod result;
pub mod state;

pub use error::{FailureKind, PipelineError, ValidationError};
pub use request::{
    decode_images, CallbackTarget, FallbackCredential, GenerationRequest, RequestLimits,
};
pub use result::PipelineResult;
pub use state::PipelineState;
