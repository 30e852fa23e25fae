use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{IdentifierStore, StoreError};
use crate::types::Identifier;

/// SQLSTATE codes worth retrying: serialization failure, deadlock, too many connections,
/// lock not available, admin shutdown and cannot connect now.
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01", "53300", "55P03", "57P01", "57P03"];

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        let retryable = match &error {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db_error) => db_error
                .code()
                .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code)),
            _ => false,
        };

        if retryable {
            StoreError::Retryable(error.to_string())
        } else {
            StoreError::Fatal(error.to_string())
        }
    }
}

/// The Known-Identifier Store on top of the `known_identifiers` PostgreSQL table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .test_before_acquire(true)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_values(ids: &[Identifier]) -> Vec<f64> {
    ids.iter().map(Identifier::value).collect()
}

#[async_trait]
impl IdentifierStore for PgStore {
    async fn batch_exists(&self, keys: &[Identifier]) -> Result<HashSet<Identifier>, StoreError> {
        let found: Vec<f64> =
            sqlx::query_scalar("SELECT id FROM known_identifiers WHERE id = ANY($1)")
                .bind(to_values(keys))
                .fetch_all(&self.pool)
                .await?;

        Ok(found.into_iter().filter_map(Identifier::new).collect())
    }

    async fn batch_insert(&self, items: &[Identifier]) -> Result<(), StoreError> {
        // A single statement, so the batch commits or fails as a whole.
        sqlx::query(
            r#"
INSERT INTO known_identifiers (id)
    (SELECT * FROM UNNEST($1::float8[]))
ON CONFLICT DO NOTHING
            "#,
        )
        .bind(to_values(items))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
