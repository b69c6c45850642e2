//! Resilient DB Library
//!
//! This library provides a single shared database connection that callers
//! resolve with bounded retry, a deadline and cancellation, generic CRUD
//! primitives over it, and transaction scopes that commit on success and roll
//! back on failure (SQLite, PostgreSQL, MySQL).

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;

pub use config::Config;
pub use db::{
    CallContext, ConnectionAccessor, ConnectionHolder, DataOperations, Record, ResolutionPolicy,
    TransactionScope,
};
pub use error::{AccessError, ConnectionError, StoreError, TxError};
pub use repository::UserRepository;
