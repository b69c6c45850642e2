//! User repository backed by the generic data operations.

use crate::db::{CallContext, ConnectionAccessor, DataOperations, TransactionScope};
use crate::error::{StoreError, StoreResult, TxError};
use crate::models::{NewUser, QueryParam, User};
use chrono::{SecondsFormat, Utc};
use tracing::{error, info};

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (\
    user_id VARCHAR(64) PRIMARY KEY, \
    user_name VARCHAR(255) NOT NULL, \
    password VARCHAR(255) NOT NULL, \
    email VARCHAR(255) NOT NULL UNIQUE, \
    created_at VARCHAR(64) NOT NULL, \
    updated_at VARCHAR(64) NOT NULL)";

/// Outcome of [`UserRepository::register_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(User),
    /// The email was already taken; the existing user is returned untouched.
    AlreadyExists(User),
}

impl Registration {
    pub fn user(&self) -> &User {
        match self {
            Self::Created(user) | Self::AlreadyExists(user) => user,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    ops: DataOperations,
    scope: TransactionScope,
}

impl UserRepository {
    pub fn new(accessor: ConnectionAccessor) -> Self {
        Self {
            ops: DataOperations::new(accessor.clone()),
            scope: TransactionScope::new(accessor),
        }
    }

    /// Create the `users` table if it does not exist yet.
    pub async fn ensure_schema(&self, ctx: &mut CallContext) -> StoreResult<()> {
        self.ops.execute_raw(ctx, CREATE_USERS_TABLE, &[]).await?;
        Ok(())
    }

    /// Insert a new user with a generated id.
    pub async fn create_user(&self, ctx: &mut CallContext, new_user: NewUser) -> StoreResult<User> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let user = User {
            user_id: uuid::Uuid::new_v4().simple().to_string(),
            user_name: new_user.user_name,
            password: new_user.password_hash,
            email: new_user.email,
            created_at: now.clone(),
            updated_at: now,
        };

        if let Err(e) = self.ops.insert(ctx, &user).await {
            error!(error = %e, "Failed to create user in the database");
            return Err(e);
        }

        info!(user_id = %user.user_id, "User created successfully");
        Ok(user)
    }

    /// Look a user up by email. An unknown email is `Ok(None)`.
    pub async fn find_user_by_email(
        &self,
        ctx: &mut CallContext,
        email: &str,
    ) -> StoreResult<Option<User>> {
        match self
            .ops
            .find_one::<User>(ctx, "email = ?", &[QueryParam::from(email)])
            .await
        {
            Ok(user) => {
                info!(user_id = %user.user_id, "User found successfully");
                Ok(Some(user))
            }
            Err(e) if e.is_not_found() => {
                info!("User not found");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Failed to find user in the database");
                Err(e)
            }
        }
    }

    /// Create a user unless the email is already registered.
    ///
    /// The lookup and the insert run in one transaction.
    pub async fn register_user(
        &self,
        ctx: &mut CallContext,
        new_user: NewUser,
    ) -> Result<Registration, TxError<StoreError>> {
        let repo = self.clone();
        self.scope
            .run_in_transaction(ctx, move |tx| {
                Box::pin(async move {
                    if let Some(existing) = repo.find_user_by_email(tx, &new_user.email).await? {
                        return Ok(Registration::AlreadyExists(existing));
                    }
                    let user = repo.create_user(tx, new_user).await?;
                    Ok::<_, StoreError>(Registration::Created(user))
                })
            })
            .await
    }
}
