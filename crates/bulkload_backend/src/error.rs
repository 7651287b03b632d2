//! Error types for engine lifecycle operations.

use crate::identity::EngineUuid;
use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while driving an engine through its lifecycle.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or transport error talking to the backend.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The backend is temporarily unable to serve the request.
    #[error("backend busy: {0}")]
    ServerBusy(String),

    /// The backend permanently rejected the request.
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The encoded rows do not match the target table.
    #[error("schema mismatch on table {table}: {message}")]
    SchemaMismatch {
        /// Table name.
        table: String,
        /// Description of the mismatch.
        message: String,
    },

    /// No engine with this identity exists in the backend.
    #[error("engine {0} not found")]
    EngineNotFound(EngineUuid),

    /// The engine is in a state that does not allow the operation.
    #[error("engine {uuid} is {state}, cannot {operation}")]
    InvalidEngineState {
        /// Engine identity.
        uuid: EngineUuid,
        /// Current lifecycle state.
        state: String,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The backend does not satisfy the version requirements.
    #[error("requirements not met: {0}")]
    Requirements(String),

    /// Remote schema could not be fetched or decoded.
    #[error("cannot read schema '{schema}' from remote: {message}")]
    RemoteSchema {
        /// Schema (database) name.
        schema: String,
        /// Underlying failure.
        message: String,
    },

    /// The table metadata is missing a field required to rebuild it.
    #[error("invalid table info for {table}: {message}")]
    InvalidTableInfo {
        /// Table name.
        table: String,
        /// What is wrong.
        message: String,
    },

    /// Row encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A retried operation kept failing with retryable errors.
    #[error("[{target}] {operation} reach max retry {attempts} and still failed: {source}")]
    RetryExhausted {
        /// Table name or engine identity the operation ran against.
        target: String,
        /// Operation name.
        operation: &'static str,
        /// Number of attempts made.
        attempts: u32,
        /// The last error returned by the backend.
        #[source]
        source: Box<BackendError>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if repeating the failed operation may succeed.
    ///
    /// This is the single predicate the retry loops consult. Cancellation,
    /// schema problems and permanent rejections are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport { retryable, .. } => *retryable,
            BackendError::ServerBusy(_) => true,
            BackendError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Returns true if this error stems from context cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            BackendError::Cancelled | BackendError::DeadlineExceeded
        )
    }
}
