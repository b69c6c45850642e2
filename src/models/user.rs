//! User records.

use crate::db::Record;
use crate::models::QueryParam;
use serde::Serialize;

/// A persisted user.
///
/// Timestamps are RFC 3339 text so every backend stores them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub user_name: String,
    /// Already hashed by the credential collaborator.
    #[serde(skip_serializing)]
    pub password: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Record for User {
    const TABLE: &'static str = "users";
    const KEY: &'static str = "user_id";
    const COLUMNS: &'static [&'static str] = &[
        "user_id",
        "user_name",
        "password",
        "email",
        "created_at",
        "updated_at",
    ];

    fn values(&self) -> Vec<QueryParam> {
        vec![
            QueryParam::from(&self.user_id),
            QueryParam::from(&self.user_name),
            QueryParam::from(&self.password),
            QueryParam::from(&self.email),
            QueryParam::from(&self.created_at),
            QueryParam::from(&self.updated_at),
        ]
    }

    fn key(&self) -> QueryParam {
        QueryParam::from(&self.user_id)
    }
}

/// Input for creating a user; validation happens before it gets here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
}
