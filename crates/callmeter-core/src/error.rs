//! Shared error type across callmeter crates.

use std::any::Any;

use thiserror::Error;

use crate::metrics::MetricKind;

/// Stable error classes (used in logs and by callers matching on failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Metric name already taken by a different metric kind.
    SinkConflict,
    /// Invalid instrumentation config.
    InvalidConfig,
    /// Executor refused the task.
    Rejected,
    /// Task cancelled before producing a value.
    Cancelled,
    /// Task panicked.
    Panicked,
    /// Deadline elapsed.
    TimedOut,
    /// Batch operation called with no tasks.
    EmptyBatch,
    /// No async runtime to execute on.
    RuntimeUnavailable,
}

impl ErrorKind {
    /// String representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SinkConflict => "SINK_CONFLICT",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::Rejected => "REJECTED",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Panicked => "PANICKED",
            ErrorKind::TimedOut => "TIMED_OUT",
            ErrorKind::EmptyBatch => "EMPTY_BATCH",
            ErrorKind::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CallmeterError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum CallmeterError {
    #[error("metric `{name}` is already registered as a {existing}, requested a {requested}")]
    SinkConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("task rejected: {0}")]
    Rejected(String),
    #[error("task cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("deadline elapsed")]
    TimedOut,
    #[error("no tasks to run")]
    EmptyBatch,
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

impl CallmeterError {
    /// Map to a stable error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallmeterError::SinkConflict { .. } => ErrorKind::SinkConflict,
            CallmeterError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CallmeterError::Rejected(_) => ErrorKind::Rejected,
            CallmeterError::Cancelled => ErrorKind::Cancelled,
            CallmeterError::Panicked(_) => ErrorKind::Panicked,
            CallmeterError::TimedOut => ErrorKind::TimedOut,
            CallmeterError::EmptyBatch => ErrorKind::EmptyBatch,
            CallmeterError::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
