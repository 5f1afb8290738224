//! # Worker error taxonomy
//!
//! Central error type aggregating every failure mode a venue worker can
//! surface. Mirrors the failure table in the runtime's error-handling
//! design: transport drops, auth failures, signing failures, venue
//! rejections, throttling, unsupported commands, and programming errors.
//!
//! No worker-internal failure is allowed to panic the worker task; every
//! fallible path returns `Result<_, WorkerError>` and the worker turns that
//! into a `WorkerEvent::Error` plus a sentinel-carrying response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single, venue-agnostic error taxonomy shared by every worker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum WorkerError {
    /// Socket close, HTTP failure, or any other connectivity drop.
    #[error("transport: {0}")]
    Transport(String),

    /// Invalid identity token, expired session, HMAC mismatch.
    #[error("auth error: {0}")]
    AuthError(String),

    /// EIP-712 or HMAC signing failure.
    #[error("sign error: {0}")]
    SignError(String),

    /// Venue returned a non-success response to an order-path command.
    #[error("venue rejected ({code}): {msg}")]
    VenueReject { code: String, msg: String },

    /// Local or venue-side rate limit hit.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Command is not valid for this venue (e.g. leverage on a prediction market).
    #[error("unsupported on this venue: {0}")]
    Unsupported(String),

    /// Unknown command tag or schema mismatch. Logged and dropped, never fatal.
    #[error("programming error: {0}")]
    Programming(String),
}

impl WorkerError {
    /// `true` for the one kind the pipeline retries automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Throttled(_))
    }
}

/// The receiving half of a channel was dropped. Mirrors the teacher's
/// `RxDropped` marker error, raised when a worker tries to forward a
/// mutation or event after its host-facing channel has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Error)]
#[error("receiver dropped")]
pub struct RxDropped;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RxDropped {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for WorkerError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        WorkerError::Programming("event receiver dropped".into())
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(value: tokio::task::JoinError) -> Self {
        WorkerError::Programming(format!("task join failed: {value:?}"))
    }
}
