//! Error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes attached to a [`WorkError`], numbered as in the connector
/// architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No specific code
    Undefined,
    /// Failure inside the work manager itself
    Internal,
    /// The unit did not start within its start timeout
    StartTimedOut,
    /// Another unit is already running in the same transaction
    TxConcurrentWorkDisallowed,
    /// The imported transaction could not be recreated
    TxRecreateFailed,
}

impl ErrorCode {
    /// Numeric code as exposed to resource adapters.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::Undefined => "-1",
            ErrorCode::Internal => "0",
            ErrorCode::StartTimedOut => "1",
            ErrorCode::TxConcurrentWorkDisallowed => "2",
            ErrorCode::TxRecreateFailed => "3",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome error of a single work unit.
///
/// `Rejected` is raised before the unit started, `Completed` after it
/// started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum WorkError {
    /// The unit was never executed
    #[error("work rejected (code {code}): {message}")]
    Rejected {
        /// Error code
        code: ErrorCode,
        /// Description
        message: String,
    },

    /// The unit started but did not complete cleanly
    #[error("work completed with error (code {code}): {message}")]
    Completed {
        /// Error code
        code: ErrorCode,
        /// Description
        message: String,
    },
}

impl WorkError {
    /// Create a rejection.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// Create a completion failure.
    pub fn completed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Completed {
            code,
            message: message.into(),
        }
    }

    /// Rejection for a unit whose start timeout elapsed.
    pub fn start_timed_out() -> Self {
        Self::rejected(ErrorCode::StartTimedOut, "start timeout elapsed before the work started")
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected { code, .. } | Self::Completed { code, .. } => *code,
        }
    }

    /// Whether the unit was rejected before it started.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Errors raised while wiring work managers to thread pools.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Named thread pool does not exist
    #[error("failed to get the thread-pool [ {pool_id} ] for resource adapter [ {ra_name} ]")]
    ThreadPoolNotFound {
        /// Requested pool id
        pool_id: String,
        /// Requesting resource adapter
        ra_name: String,
    },

    /// Default thread pool does not exist
    #[error("failed to get the default thread-pool for resource adapter [ {ra_name} ]")]
    DefaultThreadPoolNotFound {
        /// Requesting resource adapter
        ra_name: String,
    },

    /// Resource adapter name is empty
    #[error("resource adapter name must not be empty")]
    InvalidAdapterName,

    /// Two pools share an id
    #[error("duplicate thread-pool id: {0}")]
    DuplicatePool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::Undefined.code(), "-1");
        assert_eq!(ErrorCode::Internal.code(), "0");
        assert_eq!(ErrorCode::StartTimedOut.code(), "1");
        assert_eq!(ErrorCode::TxConcurrentWorkDisallowed.code(), "2");
        assert_eq!(ErrorCode::TxRecreateFailed.code(), "3");
    }

    #[test]
    fn test_start_timed_out_is_rejection() {
        let err = WorkError::start_timed_out();
        assert!(err.is_rejected());
        assert_eq!(err.code(), ErrorCode::StartTimedOut);
        assert!(err.to_string().contains("code 1"));
    }

    #[test]
    fn test_completed_is_not_rejection() {
        let err = WorkError::completed(ErrorCode::Undefined, "boom");
        assert!(!err.is_rejected());
        assert_eq!(err.to_string(), "work completed with error (code -1): boom");
    }

    #[test]
    fn test_thread_pool_not_found_message() {
        let err = ConnectorError::ThreadPoolNotFound {
            pool_id: "pool-x".to_string(),
            ra_name: "my-ra".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to get the thread-pool [ pool-x ] for resource adapter [ my-ra ]"
        );
    }
}
