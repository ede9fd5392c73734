//! Service-level error type.

use thiserror::Error;

use crate::localization::DetectionError;
use crate::radio::SubmitError;

/// Errors surfaced by the service facade.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The radio scheduler rejected a submission.
    #[error("radio submission failed: {0}")]
    Radio(#[from] SubmitError),

    /// A detection failed validation at the ingestion boundary.
    #[error("invalid detection: {0}")]
    Detection(#[from] DetectionError),

    /// The detection channel is at capacity; back off and retry.
    #[error("detection queue is full")]
    DetectionQueueFull,

    /// The service has shut down.
    #[error("service is not running")]
    NotRunning,
}
