//! Error types for resilient-db.
//!
//! Errors are layered the same way the components are: establishment
//! (`ConnectionError`), resolution (`AccessError`), data operations
//! (`StoreError`) and transaction scopes (`TxError`). Each variant keeps the
//! attempted action and the underlying cause so callers can log it as-is.

use std::time::Duration;
use thiserror::Error;

/// Establishing a fresh connection failed.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid connection configuration: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}")]
    Connect {
        message: String,
        suggestion: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Connection holder is closed")]
    Closed,
}

impl ConnectionError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connect error with a helpful suggestion.
    pub fn connect(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Connect {
            message: message.into(),
            suggestion: suggestion.into(),
            source,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connect { suggestion, .. } => Some(suggestion),
            Self::Config { .. } | Self::Closed => None,
        }
    }

    /// Configuration errors never heal by themselves; connect errors may.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

/// Resolving a usable connection for a call failed.
///
/// Both variants are recoverable: the caller may retry the whole operation later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Caller canceled while resolving a connection (after {attempts} attempt(s))")]
    CallerCanceled { attempts: u32 },

    #[error("Timeout: no usable connection after {attempts} attempt(s) in {elapsed_ms}ms")]
    Timeout { attempts: u32, elapsed_ms: u64 },
}

impl AccessError {
    /// Create a caller-canceled error.
    pub fn caller_canceled(attempts: u32) -> Self {
        Self::CallerCanceled { attempts }
    }

    /// Create a timeout error.
    pub fn timeout(attempts: u32, elapsed: Duration) -> Self {
        Self::Timeout {
            attempts,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Number of holder reads made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::CallerCanceled { attempts } | Self::Timeout { attempts, .. } => *attempts,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::CallerCanceled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A data operation failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("No matching record while {action}")]
    NotFound { action: String },

    #[error("Database error while {action}: {source}")]
    Query {
        action: String,
        /// e.g., "23505" for a unique violation on PostgreSQL
        sql_state: Option<String>,
        #[source]
        source: sqlx::Error,
    },

    #[error("Transaction already closed while {action}")]
    TransactionClosed { action: String },

    #[error("Refusing to run without a filter while {action}")]
    MissingFilter { action: String },
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(action: impl Into<String>) -> Self {
        Self::NotFound {
            action: action.into(),
        }
    }

    /// Wrap a backing-store failure with the action that was being attempted.
    ///
    /// `RowNotFound` is translated into [`StoreError::NotFound`].
    pub fn query(action: impl Into<String>, source: sqlx::Error) -> Self {
        let action = action.into();
        match source {
            sqlx::Error::RowNotFound => Self::NotFound { action },
            source => {
                let sql_state = match &source {
                    sqlx::Error::Database(db_err) => db_err.code().map(|c| c.to_string()),
                    _ => None,
                };
                Self::Query {
                    action,
                    sql_state,
                    source,
                }
            }
        }
    }

    /// Create a transaction-closed error.
    pub fn transaction_closed(action: impl Into<String>) -> Self {
        Self::TransactionClosed {
            action: action.into(),
        }
    }

    /// Create a missing-filter error.
    pub fn missing_filter(action: impl Into<String>) -> Self {
        Self::MissingFilter {
            action: action.into(),
        }
    }

    /// Absent records are an expected outcome, not an anomaly.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if retrying the whole operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Access(_) => true,
            Self::Query { source, .. } => matches!(
                source,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            Self::NotFound { .. }
            | Self::TransactionClosed { .. }
            | Self::MissingFilter { .. } => false,
        }
    }
}

/// A transaction scope failed. `E` is the unit of work's own error type.
#[derive(Error, Debug)]
pub enum TxError<E> {
    #[error("Transaction could not resolve a connection: {0}")]
    Access(#[source] AccessError),

    #[error("Failed to begin transaction: {source}")]
    BeginFailed {
        #[source]
        source: StoreError,
    },

    #[error("Transaction work failed: {source}")]
    WorkFailed {
        #[source]
        source: E,
        /// Rolling back also failed; kept for diagnostics only.
        rollback_error: Option<StoreError>,
    },

    #[error("Failed to commit transaction: {source}")]
    CommitFailed {
        #[source]
        source: StoreError,
    },
}

impl<E> TxError<E> {
    /// The unit of work's error, if the work itself failed.
    pub fn work_error(&self) -> Option<&E> {
        match self {
            Self::WorkFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Unwrap the unit of work's error, if the work itself failed.
    pub fn into_work_error(self) -> Option<E> {
        match self {
            Self::WorkFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for resolution.
pub type AccessResult<T> = Result<T, AccessError>;

/// Result type alias for data operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = StoreError::query("finding users", sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "No matching record while finding users");
    }

    #[test]
    fn test_query_error_keeps_action_and_cause() {
        let err = StoreError::query("inserting into users", sqlx::Error::PoolTimedOut);
        let msg = err.to_string();
        assert!(msg.contains("inserting into users"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::from(AccessError::timeout(3, Duration::from_secs(3))).is_retryable());
        assert!(StoreError::query("x", sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StoreError::not_found("x").is_retryable());
        assert!(!StoreError::query("x", sqlx::Error::ColumnNotFound("id".into())).is_retryable());
    }

    #[test]
    fn test_access_error_display() {
        let err = AccessError::timeout(3, Duration::from_millis(2500));
        assert_eq!(
            err.to_string(),
            "Timeout: no usable connection after 3 attempt(s) in 2500ms"
        );
        assert!(err.is_timeout());
        assert!(AccessError::caller_canceled(0).is_canceled());
    }

    #[test]
    fn test_connection_error_suggestion() {
        let err = ConnectionError::connect("refused", "Check the server", sqlx::Error::PoolClosed);
        assert_eq!(err.suggestion(), Some("Check the server"));
        assert!(err.is_retryable());
        assert!(!ConnectionError::config("bad url").is_retryable());
    }

    #[test]
    fn test_tx_error_work_error() {
        let err: TxError<StoreError> = TxError::WorkFailed {
            source: StoreError::not_found("finding users"),
            rollback_error: None,
        };
        assert!(err.work_error().is_some_and(StoreError::is_not_found));
        assert!(err.to_string().starts_with("Transaction work failed"));

        let err: TxError<StoreError> = TxError::Access(AccessError::caller_canceled(1));
        assert!(err.into_work_error().is_none());
    }
}
