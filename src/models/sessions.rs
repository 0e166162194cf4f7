//! Postgres session store.
//!
//! Sessions are keyed by the SHA-256 of the cookie token so raw tokens never
//! touch the database. Expired rows are dropped lazily when the token that
//! owns them is next presented.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{ModelError, SessionData, SessionRecord, SessionStore};

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, ModelError> {
        // Lazy expiry: an expired row is removed before the lookup so the
        // table does not accumulate dead sessions.
        let query = "DELETE FROM sessions WHERE token_hash = $1 AND expiry < now()";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;

        let query = "SELECT data, expiry FROM sessions WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: serde_json::Value = row.get("data");
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => SessionData::new(),
        };

        Ok(Some(SessionRecord {
            data,
            expiry: row.get("expiry"),
        }))
    }

    async fn save(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let payload = serde_json::Value::Object(data.clone());

        let query = r"
            INSERT INTO sessions (token_hash, data, expiry)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash)
            DO UPDATE SET data = excluded.data, expiry = excluded.expiry
        ";
        sqlx::query(query)
            .bind(token_hash)
            .bind(&payload)
            .bind(expiry)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;

        Ok(())
    }

    async fn renew(
        &self,
        old_hash: &[u8],
        new_hash: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        // Single UPDATE: concurrent requests holding the old token lose it
        // the instant the new one exists.
        let query = "UPDATE sessions SET token_hash = $2, expiry = $3 WHERE token_hash = $1";
        sqlx::query(query)
            .bind(old_hash)
            .bind(new_hash)
            .bind(expiry)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;

        Ok(())
    }

    async fn destroy(&self, token_hash: &[u8]) -> Result<(), ModelError> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;

        Ok(())
    }
}
