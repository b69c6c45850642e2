//! Executor dispatch macro for reducing code duplication.
//!
//! A resolved [`ConnectionRef`](crate::db::ConnectionRef) is either the shared
//! pool or an open transaction. The two executors have different types, so
//! the statement body is expanded once per arm.

/// Run `$body` with `$executor` bound to the executor behind a `ConnectionRef`.
///
/// A closed transaction short-circuits with `StoreError::TransactionClosed`.
///
/// # Example
///
/// ```ignore
/// let rows = with_executor!(conn, action.as_str(), |executor| {
///     sqlx::query("SELECT 1").execute(executor).await
/// });
/// ```
#[macro_export]
macro_rules! with_executor {
    ($conn:expr, $action:expr, |$executor:ident| $body:expr) => {
        match $conn {
            $crate::db::ConnectionRef::Direct(connection) => {
                let $executor = connection.pool();
                $body
            }
            $crate::db::ConnectionRef::Transactional(handle) => {
                let $executor = handle
                    .executor()
                    .ok_or_else(|| $crate::error::StoreError::transaction_closed($action))?;
                $body
            }
        }
    };
}
