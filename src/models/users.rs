//! Postgres credential store.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{ModelError, User, UserStore};

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Hash a password with a fresh random salt.
/// # Errors
/// Returns `ModelError::Hash` if the hasher rejects its input.
pub(crate) fn hash_password(password: &str) -> Result<String, ModelError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ModelError::Hash(err.to_string()))
}

/// Compare a candidate password against a stored hash.
/// # Errors
/// `InvalidCredentials` on mismatch; `Hash` if the stored value cannot be parsed.
pub(crate) fn verify_password(stored: &str, candidate: &str) -> Result<(), ModelError> {
    let parsed = PasswordHash::new(stored).map_err(|err| ModelError::Hash(err.to_string()))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(argon2::password_hash::Error::Password) => Err(ModelError::InvalidCredentials),
        Err(err) => Err(ModelError::Hash(err.to_string())),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
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
impl UserStore for PgUserStore {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError> {
        let hashed = hash_password(password)?;

        let query = r"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES ($1, $2, $3, now())
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(name)
            .bind(email)
            .bind(&hashed)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(row.get("id")),
            Err(err) if is_unique_violation(&err) => Err(ModelError::DuplicateEmail),
            Err(err) => Err(err.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let query = "SELECT id, hashed_password FROM users WHERE email = $1";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        // Unknown email and wrong password are the same error.
        let Some(row) = row else {
            return Err(ModelError::InvalidCredentials);
        };

        let stored: String = row.get("hashed_password");
        verify_password(&stored, password)?;

        Ok(row.get("id"))
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        let query = "SELECT id, name, email, created FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        row.map_or(Err(ModelError::NoRecord), |row| {
            Ok(User {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
                created: row.get("created"),
            })
        })
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        let query = "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1) AS present";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        Ok(row.get("present"))
    }

    async fn update_password(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ModelError> {
        let query = "SELECT hashed_password FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        let Some(row) = row else {
            return Err(ModelError::NoRecord);
        };

        let stored: String = row.get("hashed_password");
        verify_password(&stored, current_password)?;

        let hashed = hash_password(new_password)?;
        let query = "UPDATE users SET hashed_password = $2 WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(&hashed)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("pw123456").unwrap();
        assert!(hash.starts_with("$argon2"));
        verify_password(&hash, "pw123456").unwrap();
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("pw123456").unwrap();
        assert!(matches!(
            verify_password(&hash, "different"),
            Err(ModelError::InvalidCredentials)
        ));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("not-a-hash", "pw123456"),
            Err(ModelError::Hash(_))
        ));
    }

    #[test]
    fn hashes_are_salted() {
        let one = hash_password("pw123456").unwrap();
        let two = hash_password("pw123456").unwrap();
        assert_ne!(one, two);
    }
}
