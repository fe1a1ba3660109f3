/// Account model and database operations
///
/// Accounts own tasks. Each account carries a generated secret that the REST
/// façade uses for HTTP Basic authentication; the scheduler core only refers
/// to accounts by ID.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE accounts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     secret TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Account model representing a task owner
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,

    /// Human-readable account name
    pub name: String,

    /// Secret key used by the REST layer for HTTP Basic auth
    pub secret: String,

    /// When the account was created
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with a generated secret
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create(pool: &PgPool, name: &str) -> Result<Self, sqlx::Error> {
        let secret = Uuid::new_v4().simple().to_string();
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (name, secret)
            VALUES ($1, $2)
            RETURNING id, name, secret, created_at
            "#,
        )
        .bind(name)
        .bind(secret)
        .fetch_one(pool)
        .await?;

        tracing::info!(account_id = %account.id, "Created account");
        Ok(account)
    }

    /// Finds an account by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            "SELECT id, name, secret, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Checks an (account, secret) pair
    ///
    /// Used by the REST layer to authenticate Basic-auth credentials.
    pub async fn authenticate(pool: &PgPool, id: Uuid, secret: &str) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE id = $1 AND secret = $2")
                .bind(id)
                .bind(secret)
                .fetch_one(pool)
                .await?;

        Ok(count > 0)
    }
}
