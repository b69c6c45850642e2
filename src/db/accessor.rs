//! Connection resolution.
//!
//! [`ConnectionAccessor::resolve`] turns a [`CallContext`] into a usable
//! connection. Inside a transaction scope it hands back the embedded
//! transaction; otherwise it reads the holder, waiting a fixed delay between
//! attempts while the connection is absent or invalidated. Three exit
//! conditions are checked on every iteration: caller cancellation, the
//! attempt budget and the effective deadline.

use crate::config::{
    DEFAULT_RESOLVE_ATTEMPTS, DEFAULT_RESOLVE_DELAY_MS, DEFAULT_RESOLVE_TIMEOUT_MS,
};
use crate::db::connection::{Connection, ConnectionHolder};
use crate::db::transaction::TransactionHandle;
use crate::error::{AccessError, AccessResult};
use crate::models::DatabaseType;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed retry policy for connection resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    /// Maximum number of reads of the holder per call (at least 1).
    pub max_attempts: u32,
    /// Wait between two reads.
    pub retry_delay: Duration,
    /// Deadline applied when the caller did not set one.
    pub default_timeout: Duration,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RESOLVE_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RESOLVE_DELAY_MS),
            default_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
        }
    }
}

/// Per-call context: cancellation, optional deadline and, inside a
/// transaction scope, the transaction every nested operation must use.
#[derive(Debug, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    transaction: Option<TransactionHandle>,
}

impl CallContext {
    /// Create a context with a fresh cancellation token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context canceled by the given token.
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Get the cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context (and contexts derived from it).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether this context carries a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Get the embedded transaction, if any.
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.transaction.as_ref()
    }

    /// Derive a context embedding `handle`. Canceling `self` cancels the child.
    pub(crate) fn with_transaction(&self, handle: TransactionHandle) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            transaction: Some(handle),
        }
    }

    pub(crate) fn take_transaction(&mut self) -> Option<TransactionHandle> {
        self.transaction.take()
    }
}

/// A resolved connection: the shared handle, or the caller's transaction.
#[derive(Debug)]
pub enum ConnectionRef<'c> {
    Direct(Arc<Connection>),
    Transactional(&'c mut TransactionHandle),
}

impl ConnectionRef<'_> {
    /// Get the database type behind this reference.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            ConnectionRef::Direct(connection) => connection.db_type(),
            ConnectionRef::Transactional(handle) => handle.db_type(),
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, ConnectionRef::Transactional(_))
    }
}

/// Resolves usable connections from a [`ConnectionHolder`].
#[derive(Debug, Clone)]
pub struct ConnectionAccessor {
    holder: Arc<ConnectionHolder>,
    policy: ResolutionPolicy,
}

impl ConnectionAccessor {
    /// Create an accessor with the default policy.
    pub fn new(holder: Arc<ConnectionHolder>) -> Self {
        Self::with_policy(holder, ResolutionPolicy::default())
    }

    /// Create an accessor with a custom policy.
    pub fn with_policy(holder: Arc<ConnectionHolder>, policy: ResolutionPolicy) -> Self {
        Self { holder, policy }
    }

    /// Get the holder this accessor reads.
    pub fn holder(&self) -> &Arc<ConnectionHolder> {
        &self.holder
    }

    /// Get the resolution policy.
    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Resolve a connection for `ctx`.
    ///
    /// A context carrying a transaction gets that transaction back without
    /// any retry logic; otherwise see [`acquire`](Self::acquire).
    pub async fn resolve<'c>(&self, ctx: &'c mut CallContext) -> AccessResult<ConnectionRef<'c>> {
        match ctx.transaction {
            Some(ref mut handle) => Ok(ConnectionRef::Transactional(handle)),
            None => self
                .acquire_until(&ctx.cancel, ctx.deadline)
                .await
                .map(ConnectionRef::Direct),
        }
    }

    /// Resolve the shared connection, ignoring any embedded transaction.
    pub fn acquire(
        &self,
        ctx: &CallContext,
    ) -> impl std::future::Future<Output = AccessResult<Arc<Connection>>> + Send + '_ {
        let cancel = ctx.cancel.clone();
        let deadline = ctx.deadline;
        async move { self.acquire_until(&cancel, deadline).await }
    }

    async fn acquire_until(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> AccessResult<Arc<Connection>> {
        let started = Instant::now();
        let deadline = deadline.unwrap_or(started + self.policy.default_timeout);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        // A caller that already gave up wins over an already expired deadline.
        if cancel.is_cancelled() {
            return Err(AccessError::caller_canceled(attempts));
        }
        if deadline <= started {
            debug!("Resolution deadline already passed");
            return Err(AccessError::timeout(attempts, Duration::ZERO));
        }

        loop {
            if cancel.is_cancelled() {
                debug!(attempts, "Caller canceled during connection resolution");
                return Err(AccessError::caller_canceled(attempts));
            }

            attempts += 1;
            match self.holder.current() {
                Some(connection) if !connection.is_invalidated() => {
                    debug!(
                        attempt = attempts,
                        generation = connection.generation(),
                        "Resolved connection"
                    );
                    return Ok(connection);
                }
                Some(connection) => debug!(
                    attempt = attempts,
                    generation = connection.generation(),
                    "Current connection is invalidated; waiting for re-establishment"
                ),
                None => debug!(attempt = attempts, "No connection established yet; waiting"),
            }

            if attempts >= max_attempts {
                warn!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Connection resolution exhausted its attempts"
                );
                return Err(AccessError::timeout(attempts, started.elapsed()));
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(attempts, "Caller canceled while waiting for a connection");
                    return Err(AccessError::caller_canceled(attempts));
                }
                () = tokio::time::sleep(self.policy.retry_delay) => {}
            }

            if Instant::now() >= deadline {
                warn!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Connection resolution timed out"
                );
                return Err(AccessError::timeout(attempts, started.elapsed()));
            }
        }
    }
}
