//! Repository adapters over the data layer.

pub mod user;

pub use user::{Registration, UserRepository};
