//! Generic data operations.
//!
//! Every primitive resolves a connection through the
//! [`ConnectionAccessor`] and then runs exactly one statement. Only the
//! resolution retries; once a connection is in hand, failures surface
//! immediately as [`StoreError`].

use crate::db::accessor::{CallContext, ConnectionAccessor};
use crate::db::params::{bind_all, bind_all_as};
use crate::db::sql;
use crate::error::{StoreError, StoreResult};
use crate::models::QueryParam;
use sqlx::FromRow;
use sqlx::any::AnyRow;
use tracing::debug;

/// A persisted row type.
///
/// `values()` must yield one value per entry of `COLUMNS`, in the same order.
pub trait Record: for<'r> FromRow<'r, AnyRow> + Send + Unpin {
    /// Table the records live in.
    const TABLE: &'static str;
    /// Primary key column; must also appear in `COLUMNS`.
    const KEY: &'static str;
    /// Every persisted column.
    const COLUMNS: &'static [&'static str];

    /// Bind values for `COLUMNS`.
    fn values(&self) -> Vec<QueryParam>;

    /// Value of the primary key.
    fn key(&self) -> QueryParam;
}

/// CRUD primitives over the shared connection.
#[derive(Debug, Clone)]
pub struct DataOperations {
    accessor: ConnectionAccessor,
}

impl DataOperations {
    pub fn new(accessor: ConnectionAccessor) -> Self {
        Self { accessor }
    }

    /// Get the accessor used to resolve connections.
    pub fn accessor(&self) -> &ConnectionAccessor {
        &self.accessor
    }

    /// Fetch the first record matching `filter`.
    ///
    /// Returns [`StoreError::NotFound`] when nothing matches.
    pub async fn find_one<T: Record>(
        &self,
        ctx: &mut CallContext,
        filter: &str,
        args: &[QueryParam],
    ) -> StoreResult<T> {
        let action = format!("finding a record in {}", T::TABLE);
        let conn = self.accessor.resolve(ctx).await?;
        let sql = sql::select(T::TABLE, T::COLUMNS, filter, conn.db_type(), Some(1));

        debug!(
            table = T::TABLE,
            transactional = conn.is_transactional(),
            "Finding one record"
        );

        let row = with_executor!(conn, action.as_str(), |executor| {
            bind_all_as(sqlx::query_as::<_, T>(&sql), args)
                .fetch_optional(executor)
                .await
        });

        row.map_err(|e| StoreError::query(action.as_str(), e))?
            .ok_or_else(|| StoreError::not_found(action))
    }

    /// Fetch every record matching `filter`; an empty filter matches all rows.
    pub async fn find_many<T: Record>(
        &self,
        ctx: &mut CallContext,
        filter: &str,
        args: &[QueryParam],
    ) -> StoreResult<Vec<T>> {
        let action = format!("finding records in {}", T::TABLE);
        let conn = self.accessor.resolve(ctx).await?;
        let sql = sql::select(T::TABLE, T::COLUMNS, filter, conn.db_type(), None);

        debug!(
            table = T::TABLE,
            transactional = conn.is_transactional(),
            "Finding records"
        );

        let rows = with_executor!(conn, action.as_str(), |executor| {
            bind_all_as(sqlx::query_as::<_, T>(&sql), args)
                .fetch_all(executor)
                .await
        });

        rows.map_err(|e| StoreError::query(action, e))
    }

    /// Run a caller-written query and map every row.
    ///
    /// The SQL is passed through unchanged, so it must use the backend's own
    /// placeholder syntax.
    pub async fn find_by_raw_query<T>(
        &self,
        ctx: &mut CallContext,
        raw_query: &str,
        args: &[QueryParam],
    ) -> StoreResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, AnyRow> + Send + Unpin,
    {
        let action = "running a raw query".to_string();
        let conn = self.accessor.resolve(ctx).await?;

        debug!(
            sql = %raw_query,
            params = args.len(),
            transactional = conn.is_transactional(),
            "Running raw query"
        );

        let rows = with_executor!(conn, action.as_str(), |executor| {
            bind_all_as(sqlx::query_as::<_, T>(raw_query), args)
                .fetch_all(executor)
                .await
        });

        rows.map_err(|e| StoreError::query(action, e))
    }

    /// Insert `record`. Returns the number of rows written.
    pub async fn insert<T: Record>(&self, ctx: &mut CallContext, record: &T) -> StoreResult<u64> {
        let action = format!("inserting into {}", T::TABLE);
        let values = record.values();
        debug_assert_eq!(values.len(), T::COLUMNS.len());

        let conn = self.accessor.resolve(ctx).await?;
        let sql = sql::insert(T::TABLE, T::COLUMNS, conn.db_type());

        debug!(
            table = T::TABLE,
            transactional = conn.is_transactional(),
            "Inserting record"
        );

        let result = with_executor!(conn, action.as_str(), |executor| {
            bind_all(sqlx::query(&sql), &values).execute(executor).await
        });

        result
            .map(|r| r.rows_affected())
            .map_err(|e| StoreError::query(action, e))
    }

    /// Overwrite every non-key column of the row keyed by `record`.
    ///
    /// Returns [`StoreError::NotFound`] when no row has that key.
    pub async fn update<T: Record>(&self, ctx: &mut CallContext, record: &T) -> StoreResult<u64> {
        let action = format!("updating {}", T::TABLE);
        let (set_columns, mut values): (Vec<&str>, Vec<QueryParam>) = T::COLUMNS
            .iter()
            .copied()
            .zip(record.values())
            .filter(|(column, _)| *column != T::KEY)
            .unzip();
        values.push(record.key());

        let conn = self.accessor.resolve(ctx).await?;
        let sql = sql::update(T::TABLE, &set_columns, T::KEY, conn.db_type());

        debug!(
            table = T::TABLE,
            transactional = conn.is_transactional(),
            "Updating record"
        );

        let result = with_executor!(conn, action.as_str(), |executor| {
            bind_all(sqlx::query(&sql), &values).execute(executor).await
        });

        match result.map_err(|e| StoreError::query(action.as_str(), e))? {
            r if r.rows_affected() == 0 => Err(StoreError::not_found(action)),
            r => Ok(r.rows_affected()),
        }
    }

    /// Delete the records matching `filter`. Returns the number of rows removed.
    ///
    /// An empty filter is rejected rather than clearing the table.
    pub async fn delete<T: Record>(
        &self,
        ctx: &mut CallContext,
        filter: &str,
        args: &[QueryParam],
    ) -> StoreResult<u64> {
        let action = format!("deleting from {}", T::TABLE);
        if filter.trim().is_empty() {
            return Err(StoreError::missing_filter(action));
        }

        let conn = self.accessor.resolve(ctx).await?;
        let sql = sql::delete(T::TABLE, filter, conn.db_type());

        debug!(
            table = T::TABLE,
            transactional = conn.is_transactional(),
            "Deleting records"
        );

        let result = with_executor!(conn, action.as_str(), |executor| {
            bind_all(sqlx::query(&sql), args).execute(executor).await
        });

        result
            .map(|r| r.rows_affected())
            .map_err(|e| StoreError::query(action, e))
    }

    /// Execute a caller-written statement (DDL or DML). Returns rows affected.
    pub async fn execute_raw(
        &self,
        ctx: &mut CallContext,
        statement: &str,
        args: &[QueryParam],
    ) -> StoreResult<u64> {
        let action = "executing a raw statement".to_string();
        let conn = self.accessor.resolve(ctx).await?;

        debug!(
            sql = %statement,
            params = args.len(),
            transactional = conn.is_transactional(),
            "Executing raw statement"
        );

        let result = with_executor!(conn, action.as_str(), |executor| {
            bind_all(sqlx::query(statement), args).execute(executor).await
        });

        result
            .map(|r| r.rows_affected())
            .map_err(|e| StoreError::query(action, e))
    }
}
