//! Application error types

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Application-wide error type
///
/// Engine failures carry a correlation id; the full detail is logged
/// server-side and never formatted into a client-visible message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The inference engine could not be reached at all.
    #[error("inference engine unreachable: {0}")]
    ChannelSetup(String),

    /// The engine failed mid-generation.
    #[error("generation failed [correlation {correlation_id}]")]
    Engine {
        correlation_id: Uuid,
        detail: String,
    },

    #[error("admission wait timed out after {0:?}")]
    AdmissionTimeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an engine failure with a fresh correlation id.
    pub fn engine(detail: impl Into<String>) -> Self {
        AppError::Engine {
            correlation_id: Uuid::new_v4(),
            detail: detail.into(),
        }
    }

    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            AppError::Engine { correlation_id, .. } => Some(*correlation_id),
            _ => None,
        }
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::ChannelSetup(_) => {
                tonic::Status::unavailable("inference engine unavailable")
            }
            AppError::Engine { correlation_id, .. } => tonic::Status::internal(format!(
                "generation failed [correlation {}]",
                correlation_id
            )),
            AppError::AdmissionTimeout(wait) => tonic::Status::resource_exhausted(format!(
                "no capacity after waiting {}ms",
                wait.as_millis()
            )),
            AppError::Config(_) | AppError::Internal(_) => {
                tonic::Status::internal("internal error")
            }
        }
    }
}

/// Result type alias using AppError
pub type Result<T, E = AppError> = std::result::Result<T, E>;
