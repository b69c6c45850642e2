//! Data models for resilient-db.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod user;

// Re-export commonly used types
pub use connection::{DatabaseConfig, DatabaseConfigError, DatabaseType};
pub use query::QueryParam;
pub use user::{NewUser, User};
