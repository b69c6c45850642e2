//! Database access layer.
//!
//! This module provides the resilient shared-connection accessor:
//! - Connection holder with atomic publish and health monitoring
//! - Connection resolution with bounded retry, deadline and cancellation
//! - Generic CRUD primitives over the resolved connection
//! - Transaction scopes with commit-on-success / rollback-on-failure
//! - Executor dispatch macro for pool vs. transaction statements

pub mod accessor;
pub mod connection;
#[macro_use]
pub mod macros;
pub mod operations;
mod params;
mod sql;
pub mod transaction;

pub use accessor::{CallContext, ConnectionAccessor, ConnectionRef, ResolutionPolicy};
pub use connection::{Connection, ConnectionHolder};
pub use operations::{DataOperations, Record};
pub use transaction::{TransactionHandle, TransactionScope, TransactionState};
