//! Transaction handles and scopes.
//!
//! A [`TransactionHandle`] owns one open transaction on the resolved
//! connection. [`TransactionScope::run_in_transaction`] begins it, runs the
//! caller's unit of work with the handle embedded in a derived
//! [`CallContext`], then commits or rolls back.

use crate::db::accessor::{CallContext, ConnectionAccessor};
use crate::db::connection::Connection;
use crate::error::{StoreError, StoreResult, TxError};
use crate::models::DatabaseType;
use futures_util::future::BoxFuture;
use sqlx::{Any, AnyConnection, Transaction};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of a transaction handle. `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Begun,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction is still open.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Begun)
    }
}

/// An open transaction owned by a single scope.
pub struct TransactionHandle {
    id: String,
    transaction: Option<Transaction<'static, Any>>,
    connection: Arc<Connection>,
    state: TransactionState,
    started_at: Instant,
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl TransactionHandle {
    /// Begin a transaction on `connection`.
    pub async fn begin(connection: Arc<Connection>) -> StoreResult<Self> {
        let transaction = connection
            .pool()
            .begin()
            .await
            .map_err(|e| StoreError::query("beginning a transaction", e))?;
        let id = generate_transaction_id();

        debug!(
            transaction_id = %id,
            generation = connection.generation(),
            "Transaction started"
        );

        Ok(Self {
            id,
            transaction: Some(transaction),
            connection,
            state: TransactionState::Begun,
            started_at: Instant::now(),
        })
    }

    /// Unique transaction identifier (for logs).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        self.connection.db_type()
    }

    /// The shared connection this transaction was opened on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Executor for statements inside the transaction; `None` once closed.
    pub fn executor(&mut self) -> Option<&mut AnyConnection> {
        self.transaction.as_deref_mut()
    }

    /// Commit the transaction.
    ///
    /// A failed commit leaves nothing to commit, so the handle ends up
    /// `RolledBack` either way.
    pub async fn commit(&mut self) -> StoreResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::transaction_closed("committing a transaction"))?;

        match transaction.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                info!(
                    transaction_id = %self.id,
                    duration_ms = self.started_at.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                Err(StoreError::query("committing a transaction", e))
            }
        }
    }

    /// Roll back the transaction.
    pub async fn rollback(&mut self) -> StoreResult<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::transaction_closed("rolling back a transaction"))?;

        self.state = TransactionState::RolledBack;
        transaction
            .rollback()
            .await
            .map_err(|e| StoreError::query("rolling back a transaction", e))?;

        info!(
            transaction_id = %self.id,
            duration_ms = self.started_at.elapsed().as_millis() as u64,
            "Transaction rolled back"
        );
        Ok(())
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

/// Runs units of work atomically.
#[derive(Debug, Clone)]
pub struct TransactionScope {
    accessor: ConnectionAccessor,
}

impl TransactionScope {
    pub fn new(accessor: ConnectionAccessor) -> Self {
        Self { accessor }
    }

    /// Run `work` inside a transaction.
    ///
    /// `work` is invoked at most once, with a context whose data operations
    /// all use the same transaction. It is committed when `work` succeeds and
    /// rolled back when it fails; a rollback failure is logged and attached to
    /// [`TxError::WorkFailed`] without replacing the work's own error.
    ///
    /// If `ctx` already carries a transaction, `work` joins it and the
    /// enclosing scope decides the outcome.
    ///
    /// # Usage
    ///
    /// ```ignore
    /// let ops = ops.clone();
    /// scope
    ///     .run_in_transaction(&mut ctx, move |tx| {
    ///         Box::pin(async move {
    ///             ops.insert(tx, &user).await?;
    ///             Ok::<_, StoreError>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<F, R, E>(
        &self,
        ctx: &mut CallContext,
        work: F,
    ) -> Result<R, TxError<E>>
    where
        F: for<'c> FnOnce(&'c mut CallContext) -> BoxFuture<'c, Result<R, E>>,
    {
        if ctx.in_transaction() {
            debug!("Joining enclosing transaction");
            return work(ctx).await.map_err(|source| TxError::WorkFailed {
                source,
                rollback_error: None,
            });
        }

        let connection = self.accessor.acquire(ctx).await.map_err(TxError::Access)?;
        let handle = TransactionHandle::begin(connection)
            .await
            .map_err(|source| TxError::BeginFailed { source })?;
        let transaction_id = handle.id().to_string();

        let mut tx_ctx = ctx.with_transaction(handle);
        let outcome = work(&mut tx_ctx).await;

        let Some(mut handle) = tx_ctx.take_transaction() else {
            let closed = StoreError::transaction_closed("finishing a transaction");
            return Err(match outcome {
                Ok(_) => TxError::CommitFailed { source: closed },
                Err(source) => TxError::WorkFailed {
                    source,
                    rollback_error: Some(closed),
                },
            });
        };

        match outcome {
            Ok(value) => {
                handle
                    .commit()
                    .await
                    .map_err(|source| TxError::CommitFailed { source })?;
                Ok(value)
            }
            Err(source) => {
                let rollback_error = match handle.rollback().await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(
                            transaction_id = %transaction_id,
                            error = %e,
                            "Rollback failed after unit of work error"
                        );
                        Some(e)
                    }
                };
                Err(TxError::WorkFailed {
                    source,
                    rollback_error,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::db::connection::ConnectionHolder;
    use crate::models::DatabaseConfig;

    async fn memory_scope() -> TransactionScope {
        let config = DatabaseConfig::new("sqlite::memory:", PoolOptions::default()).unwrap();
        let holder = Arc::new(ConnectionHolder::new(config));
        holder.establish().await.unwrap();
        TransactionScope::new(ConnectionAccessor::new(holder))
    }

    #[test]
    fn test_transaction_state() {
        assert!(TransactionState::Begun.is_active());
        assert!(!TransactionState::Committed.is_active());
        assert!(!TransactionState::RolledBack.is_active());
    }

    #[test]
    fn test_transaction_id_format() {
        let id = generate_transaction_id();
        assert!(id.starts_with("tx_"));
        assert_eq!(id.len(), 3 + 32);
        assert_ne!(id, generate_transaction_id());
    }

    #[tokio::test]
    async fn test_work_that_drops_transaction_fails_commit() {
        let scope = memory_scope().await;

        let err = scope
            .run_in_transaction(&mut CallContext::new(), |tx| {
                Box::pin(async move {
                    drop(tx.take_transaction());
                    Ok::<_, StoreError>(())
                })
            })
            .await
            .unwrap_err();

        match err {
            TxError::CommitFailed {
                source: StoreError::TransactionClosed { .. },
            } => {}
            other => panic!("expected commit failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_work_keeps_its_error_when_rollback_fails() {
        let scope = memory_scope().await;

        let err = scope
            .run_in_transaction(&mut CallContext::new(), |tx| {
                Box::pin(async move {
                    drop(tx.take_transaction());
                    Err::<(), _>(StoreError::not_found("loading the account"))
                })
            })
            .await
            .unwrap_err();

        match err {
            TxError::WorkFailed {
                source,
                rollback_error: Some(StoreError::TransactionClosed { .. }),
            } => assert!(source.is_not_found()),
            other => panic!("expected work failure with rollback error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transaction_finished_inside_work_cannot_commit() {
        let scope = memory_scope().await;

        let err = scope
            .run_in_transaction(&mut CallContext::new(), |tx| {
                Box::pin(async move {
                    let Some(mut handle) = tx.take_transaction() else {
                        return Err(StoreError::transaction_closed("test setup"));
                    };
                    handle.rollback().await?;
                    assert_eq!(handle.state(), TransactionState::RolledBack);
                    *tx = tx.with_transaction(handle);
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TxError::CommitFailed {
                source: StoreError::TransactionClosed { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_handle_cannot_finish_twice() {
        let scope = memory_scope().await;
        let connection = scope.accessor.acquire(&CallContext::new()).await.unwrap();

        let mut handle = TransactionHandle::begin(connection).await.unwrap();
        assert!(handle.executor().is_some());
        handle.commit().await.unwrap();
        assert_eq!(handle.state(), TransactionState::Committed);
        assert!(handle.executor().is_none());

        let err = handle.rollback().await.unwrap_err();
        assert!(matches!(err, StoreError::TransactionClosed { .. }));
        assert_eq!(handle.state(), TransactionState::Committed);
    }
}
