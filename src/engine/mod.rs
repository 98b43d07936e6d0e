//! Inference engine abstraction
//!
//! The engine itself (model loading, batching, GPU scheduling) is an
//! external collaborator. The gateway only depends on this trait: a lazy
//! stream of cumulative-output snapshots per request, plus a status
//! accessor for the engine's own scheduler backlog.

pub mod http_engine;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

pub use http_engine::HttpEngine;

/// Sampling parameters and prompt for one generation call.
///
/// Immutable once constructed; defaults match the serving deployment
/// (50 output units, temperature 0.8).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: String,
    pub prompt: String,
    pub max_output_units: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub const DEFAULT_MAX_OUTPUT_UNITS: u32 = 50;
    pub const DEFAULT_TEMPERATURE: f32 = 0.8;

    /// Build a request with a fresh id, substituting defaults for
    /// unset sampling parameters (0 tokens, non-positive temperature).
    pub fn new(prompt: String, max_output_units: u32, temperature: f32) -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4().simple()),
            prompt,
            max_output_units: if max_output_units == 0 {
                Self::DEFAULT_MAX_OUTPUT_UNITS
            } else {
                max_output_units
            },
            temperature: if temperature > 0.0 {
                temperature
            } else {
                Self::DEFAULT_TEMPERATURE
            },
        }
    }
}

/// Everything generated so far for one request, as produced by the
/// engine at each step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
}

/// Lazy, finite sequence of cumulative-output snapshots
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot>> + Send>>;

/// Contract the gateway holds against the generation engine
#[async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    /// Start one generation and return its snapshot stream.
    ///
    /// Returns `AppError::ChannelSetup` when the engine cannot be
    /// reached at all; errors mid-stream surface as stream items.
    async fn generate(&self, request: GenerationRequest) -> Result<SnapshotStream>;

    /// Current number of requests waiting inside the engine's own
    /// internal scheduler.
    async fn queued_requests(&self) -> Result<usize>;

    /// Signal the engine to stop an in-progress generation.
    ///
    /// Dropping the snapshot stream already cancels transport-level
    /// work; this hook exists for engines that need an explicit abort.
    fn abort(&self, _request_id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_applied() {
        let req = GenerationRequest::new("hello".to_string(), 0, 0.0);
        assert_eq!(req.max_output_units, 50);
        assert!((req.temperature - 0.8).abs() < f32::EPSILON);
        assert!(req.request_id.starts_with("req-"));
    }

    #[test]
    fn test_request_explicit_params_kept() {
        let req = GenerationRequest::new("hello".to_string(), 128, 0.2);
        assert_eq!(req.max_output_units, 128);
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = GenerationRequest::new("x".to_string(), 1, 1.0);
        let b = GenerationRequest::new("x".to_string(), 1, 1.0);
        assert_ne!(a.request_id, b.request_id);
    }
}
