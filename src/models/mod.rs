//! SQL-backed stores for users, snippets, and sessions.

pub mod mem;
pub mod sessions;
pub mod snippets;
pub mod users;

pub use self::sessions::PgSessionStore;
pub use self::snippets::PgSnippetStore;
pub use self::users::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Serialized per-session key/value payload.
pub type SessionData = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ModelError {
    /// No matching record for the given identifier.
    #[error("no matching record found")]
    NoRecord,
    /// Same error for an unknown email and a wrong password, so the store
    /// never reveals which accounts exist.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The email is already taken by another user.
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("password hash: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Session payload plus its absolute expiry, as loaded from the store.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub data: SessionData,
    pub expiry: DateTime<Utc>,
}

/// Credential store: maps emails to user records and owns password hashing.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Hash the password and insert the record.
    /// # Errors
    /// `DuplicateEmail` when the email is already registered.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError>;

    /// Verify credentials and return the user id.
    /// # Errors
    /// `InvalidCredentials` for an unknown email or a wrong password.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    /// # Errors
    /// `NoRecord` when no user has this id.
    async fn get(&self, id: i64) -> Result<User, ModelError>;

    async fn exists(&self, id: i64) -> Result<bool, ModelError>;

    /// Re-verify the current password, then replace the stored hash.
    /// # Errors
    /// `InvalidCredentials` when the current password does not match.
    async fn update_password(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ModelError>;
}

#[async_trait]
pub trait SnippetStore: Send + Sync {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i64,
    ) -> Result<i64, ModelError>;

    /// # Errors
    /// `NoRecord` for a missing or expired snippet.
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// Ten most recent unexpired snippets, newest first.
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}

/// Durable session store keyed by the SHA-256 of the cookie token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the payload for a token hash. Expired entries are dropped on
    /// read and reported as missing.
    async fn load(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, ModelError>;

    async fn save(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError>;

    /// Re-key a session in one step so the old token stops resolving the
    /// moment the new one exists.
    async fn renew(
        &self,
        old_hash: &[u8],
        new_hash: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError>;

    async fn destroy(&self, token_hash: &[u8]) -> Result<(), ModelError>;
}
