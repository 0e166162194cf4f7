//! Postgres snippet store.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{ModelError, Snippet, SnippetStore};

pub struct PgSnippetStore {
    pool: PgPool,
}

impl PgSnippetStore {
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

fn snippet_from_row(row: &sqlx::postgres::PgRow) -> Snippet {
    Snippet {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        created: row.get("created"),
        expires: row.get("expires"),
    }
}

#[async_trait]
impl SnippetStore for PgSnippetStore {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i64,
    ) -> Result<i64, ModelError> {
        let expires = Utc::now() + Duration::days(expires_days);

        let query = r"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, now(), $3)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(title)
            .bind(content)
            .bind(expires)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;

        Ok(row.get("id"))
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        let query = r"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > now() AND id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        row.map_or(Err(ModelError::NoRecord), |row| Ok(snippet_from_row(&row)))
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let query = r"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > now()
            ORDER BY created DESC
            LIMIT 10
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(rows.iter().map(snippet_from_row).collect())
    }
}
