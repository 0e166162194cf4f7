//! In-memory store implementations.
//!
//! These back the integration tests (and are handy for local hacking without
//! a database). Semantics mirror the Postgres stores, including lazy session
//! expiry and the shared credential error taxonomy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::users::{hash_password, verify_password};
use super::{
    ModelError, SessionData, SessionRecord, SessionStore, Snippet, SnippetStore, User, UserStore,
};

#[derive(Debug, Clone)]
struct MemUser {
    id: i64,
    name: String,
    email: String,
    hashed_password: String,
    created: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemUserStore {
    users: Mutex<Vec<MemUser>>,
}

impl MemUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MemUser>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemUserStore {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<i64, ModelError> {
        let hashed = hash_password(password)?;
        let mut users = self.lock();

        if users.iter().any(|user| user.email == email) {
            return Err(ModelError::DuplicateEmail);
        }

        let id = users.last().map_or(1, |user| user.id + 1);
        users.push(MemUser {
            id,
            name: name.to_string(),
            email: email.to_string(),
            hashed_password: hashed,
            created: Utc::now(),
        });

        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let user = self
            .lock()
            .iter()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(ModelError::InvalidCredentials)?;

        verify_password(&user.hashed_password, password)?;

        Ok(user.id)
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        self.lock()
            .iter()
            .find(|user| user.id == id)
            .map(|user| User {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                created: user.created,
            })
            .ok_or(ModelError::NoRecord)
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        Ok(self.lock().iter().any(|user| user.id == id))
    }

    async fn update_password(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ModelError> {
        let stored = self
            .lock()
            .iter()
            .find(|user| user.id == id)
            .map(|user| user.hashed_password.clone())
            .ok_or(ModelError::NoRecord)?;

        verify_password(&stored, current_password)?;

        let hashed = hash_password(new_password)?;
        let mut users = self.lock();
        if let Some(user) = users.iter_mut().find(|user| user.id == id) {
            user.hashed_password = hashed;
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemSnippetStore {
    snippets: Mutex<Vec<Snippet>>,
}

impl MemSnippetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Snippet>> {
        self.snippets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SnippetStore for MemSnippetStore {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i64,
    ) -> Result<i64, ModelError> {
        let mut snippets = self.lock();
        let id = snippets.last().map_or(1, |snippet| snippet.id + 1);
        snippets.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created: Utc::now(),
            expires: Utc::now() + chrono::Duration::days(expires_days),
        });

        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        self.lock()
            .iter()
            .find(|snippet| snippet.id == id && snippet.expires > Utc::now())
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let mut snippets: Vec<Snippet> = self
            .lock()
            .iter()
            .filter(|snippet| snippet.expires > Utc::now())
            .cloned()
            .collect();
        snippets.sort_by(|a, b| b.created.cmp(&a.created));
        snippets.truncate(10);

        Ok(snippets)
    }
}

#[derive(Debug, Default)]
pub struct MemSessionStore {
    sessions: Mutex<HashMap<Vec<u8>, SessionRecord>>,
}

impl MemSessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Vec<u8>, SessionRecord>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live rows, for tests asserting cleanup.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemSessionStore {
    async fn load(&self, token_hash: &[u8]) -> Result<Option<SessionRecord>, ModelError> {
        let mut sessions = self.lock();
        match sessions.get(token_hash) {
            Some(record) if record.expiry > Utc::now() => Ok(Some(record.clone())),
            Some(_) => {
                sessions.remove(token_hash);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        token_hash: &[u8],
        data: &SessionData,
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        self.lock().insert(
            token_hash.to_vec(),
            SessionRecord {
                data: data.clone(),
                expiry,
            },
        );

        Ok(())
    }

    async fn renew(
        &self,
        old_hash: &[u8],
        new_hash: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let mut sessions = self.lock();
        if let Some(mut record) = sessions.remove(old_hash) {
            record.expiry = expiry;
            sessions.insert(new_hash.to_vec(), record);
        }

        Ok(())
    }

    async fn destroy(&self, token_hash: &[u8]) -> Result<(), ModelError> {
        self.lock().remove(token_hash);

        Ok(())
    }
}
