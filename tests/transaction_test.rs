//! Integration tests for transaction scopes.

use resilient_db::config::PoolOptions;
use resilient_db::db::{
    CallContext, Connection, ConnectionAccessor, ConnectionHolder, DataOperations, Record,
    ResolutionPolicy, TransactionScope,
};
use resilient_db::error::{StoreError, TxError};
use resilient_db::models::{DatabaseConfig, QueryParam};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Account {
    id: String,
    balance: i64,
}

impl Record for Account {
    const TABLE: &'static str = "accounts";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "balance"];

    fn values(&self) -> Vec<QueryParam> {
        vec![QueryParam::from(&self.id), QueryParam::from(self.balance)]
    }

    fn key(&self) -> QueryParam {
        QueryParam::from(&self.id)
    }
}

fn account(id: &str, balance: i64) -> Account {
    Account {
        id: id.to_string(),
        balance,
    }
}

#[derive(Debug, thiserror::Error)]
enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("insufficient funds")]
    InsufficientFunds,
}

struct Fixture {
    _file: NamedTempFile,
    holder: Arc<ConnectionHolder>,
    ops: DataOperations,
    scope: TransactionScope,
}

async fn setup() -> Fixture {
    let file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", file.path().to_str().unwrap());
    let config = DatabaseConfig::new(&url, PoolOptions::default()).unwrap();

    let holder = Arc::new(ConnectionHolder::new(config));
    holder.establish().await.unwrap();

    let accessor = ConnectionAccessor::new(Arc::clone(&holder));
    let ops = DataOperations::new(accessor.clone());
    ops.execute_raw(
        &mut CallContext::new(),
        "CREATE TABLE accounts (id TEXT PRIMARY KEY, balance INTEGER NOT NULL)",
        &[],
    )
    .await
    .unwrap();

    Fixture {
        _file: file,
        holder,
        ops,
        scope: TransactionScope::new(accessor),
    }
}

async fn balances(ops: &DataOperations) -> Vec<Account> {
    let mut rows: Vec<Account> = ops.find_many(&mut CallContext::new(), "", &[]).await.unwrap();
    rows.sort_by(|a, b| a.id.cmp(&b.id));
    rows
}

#[tokio::test]
async fn test_commit_on_success() {
    let fx = setup().await;
    let ops = fx.ops.clone();

    let written = fx
        .scope
        .run_in_transaction(&mut CallContext::new(), move |tx| {
            Box::pin(async move {
                assert!(tx.in_transaction());
                let mut written = ops.insert(tx, &account("alice", 100)).await?;
                written += ops.insert(tx, &account("bob", 50)).await?;
                Ok::<_, StoreError>(written)
            })
        })
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(
        balances(&fx.ops).await,
        vec![account("alice", 100), account("bob", 50)]
    );
}

#[tokio::test]
async fn test_rollback_on_failure_returns_work_error() {
    let fx = setup().await;
    fx.ops
        .insert(&mut CallContext::new(), &account("alice", 10))
        .await
        .unwrap();
    let ops = fx.ops.clone();

    let err = fx
        .scope
        .run_in_transaction(&mut CallContext::new(), move |tx| {
            Box::pin(async move {
                ops.insert(tx, &account("bob", 25)).await?;
                let alice: Account = ops
                    .find_one(tx, "id = ?", &[QueryParam::from("alice")])
                    .await?;
                if alice.balance < 25 {
                    return Err(TransferError::InsufficientFunds);
                }
                Ok::<_, TransferError>(())
            })
        })
        .await
        .unwrap_err();

    match err {
        TxError::WorkFailed {
            source: TransferError::InsufficientFunds,
            rollback_error: None,
        } => {}
        other => panic!("expected work failure, got {other:?}"),
    }
    assert_eq!(balances(&fx.ops).await, vec![account("alice", 10)]);
}

#[tokio::test]
async fn test_work_is_invoked_exactly_once() {
    let fx = setup().await;
    let calls = Arc::new(AtomicU32::new(0));

    for fail in [false, true] {
        let calls = Arc::clone(&calls);
        let result = fx
            .scope
            .run_in_transaction(&mut CallContext::new(), move |_tx| {
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if fail {
                        Err(TransferError::InsufficientFunds)
                    } else {
                        Ok(())
                    }
                })
            })
            .await;
        assert_eq!(result.is_err(), fail);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_operations_inside_scope_see_uncommitted_writes() {
    let fx = setup().await;
    let ops = fx.ops.clone();

    // SQLite pools hold a single connection here, so any operation that
    // bypassed the transaction would wait for the pool instead of seeing
    // the uncommitted row.
    let seen = fx
        .scope
        .run_in_transaction(&mut CallContext::new(), move |tx| {
            Box::pin(async move {
                ops.insert(tx, &account("carol", 5)).await?;
                ops.update(tx, &account("carol", 7)).await?;
                let carol: Account = ops
                    .find_one(tx, "id = ?", &[QueryParam::from("carol")])
                    .await?;
                Ok::<_, StoreError>(carol)
            })
        })
        .await
        .unwrap();

    assert_eq!(seen, account("carol", 7));
    assert_eq!(balances(&fx.ops).await, vec![account("carol", 7)]);
}

#[tokio::test]
async fn test_nested_scope_joins_enclosing_transaction() {
    let fx = setup().await;
    let ops = fx.ops.clone();
    let scope = fx.scope.clone();

    let err = fx
        .scope
        .run_in_transaction(&mut CallContext::new(), move |tx| {
            Box::pin(async move {
                ops.insert(tx, &account("outer", 1)).await?;

                let inner_ops = ops.clone();
                scope
                    .run_in_transaction(tx, move |inner| {
                        Box::pin(async move {
                            inner_ops.insert(inner, &account("inner", 2)).await?;
                            Ok::<_, TransferError>(())
                        })
                    })
                    .await
                    .map_err(|e| e.into_work_error().unwrap_or(TransferError::InsufficientFunds))?;

                // Both rows are visible through the shared transaction.
                let rows: Vec<Account> = ops.find_many(tx, "", &[]).await?;
                assert_eq!(rows.len(), 2);

                Err::<(), _>(TransferError::InsufficientFunds)
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.work_error(),
        Some(TransferError::InsufficientFunds)
    ));
    // The outer failure rolled back the inner write too.
    assert!(balances(&fx.ops).await.is_empty());
}

#[tokio::test]
async fn test_scope_without_connection_never_runs_work() {
    let fx = setup().await;
    fx.holder.close().await;

    let policy = ResolutionPolicy {
        max_attempts: 2,
        retry_delay: Duration::from_millis(10),
        default_timeout: Duration::from_secs(1),
    };
    let scope = TransactionScope::new(ConnectionAccessor::with_policy(
        Arc::clone(&fx.holder),
        policy,
    ));
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let err = scope
        .run_in_transaction(&mut CallContext::new(), move |_tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
        })
        .await
        .unwrap_err();

    match err {
        TxError::Access(access) => assert_eq!(access.attempts(), 2),
        other => panic!("expected access error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_canceled_context_never_begins() {
    let fx = setup().await;
    let mut ctx = CallContext::new();
    ctx.cancel();

    let err = fx
        .scope
        .run_in_transaction(&mut ctx, |_tx| {
            Box::pin(async move { Ok::<_, StoreError>(()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::Access(ref a) if a.is_canceled()));
}

#[tokio::test]
async fn test_begin_failure_never_runs_work() {
    let config = DatabaseConfig::new("sqlite::memory:", PoolOptions::default()).unwrap();
    let holder = Arc::new(ConnectionHolder::new(config));
    let connection = Connection::connect_lazy(holder.config()).unwrap();
    connection.pool().close().await;
    holder.publish(connection);

    let scope = TransactionScope::new(ConnectionAccessor::new(holder));
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    let err = scope
        .run_in_transaction(&mut CallContext::new(), move |_tx| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(())
            })
        })
        .await
        .unwrap_err();

    match err {
        TxError::BeginFailed {
            source: StoreError::Query { ref action, .. },
        } => assert_eq!(action, "beginning a transaction"),
        other => panic!("expected begin failure, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
