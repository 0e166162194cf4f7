//! Cookie token handling and the request-scoped session handle.
//!
//! The cookie carries only an opaque token; all session data lives server
//! side, keyed by the SHA-256 of that token. The `Session` handle is shared
//! between the session middleware and the handlers through request
//! extensions, and tracks whether the payload needs persisting when the
//! response completes.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::SessionData;

pub const KEY_USER_ID: &str = "authenticatedUserID";
pub const KEY_ORIGINAL_PAGE: &str = "originalPage";
pub const KEY_CSRF_TOKEN: &str = "csrfToken";
pub const KEY_FLASH: &str = "flash";

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the store is keyed by a hash.
#[must_use]
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a session token so raw values never touch the database.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Pull the session token out of the request's cookie header, if present.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == cookie_name {
            return Some(val.to_string());
        }
    }
    None
}

/// Build the `HttpOnly` session cookie.
/// # Errors
/// Returns an error if the token produces an invalid header value.
pub fn session_cookie(
    cookie_name: &str,
    token: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{cookie_name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie that removes the session from the client.
/// # Errors
/// Returns an error if the name produces an invalid header value.
pub fn clear_session_cookie(
    cookie_name: &str,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{cookie_name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// What the session middleware must do with the payload after the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unchanged,
    Modified,
    /// Privilege changed; rotate the token and reset the expiry.
    Renewed,
    /// Remove the store entry and expire the cookie.
    Destroyed,
}

#[derive(Debug)]
struct Inner {
    data: SessionData,
    status: SessionStatus,
    expiry: DateTime<Utc>,
}

/// Request-scoped session handle, cheap to clone into handlers.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

impl Session {
    #[must_use]
    pub fn new(data: SessionData, expiry: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                data,
                status: SessionStatus::Unchanged,
                expiry,
            })),
        }
    }

    /// Fresh anonymous session with the given lifetime.
    #[must_use]
    pub fn anonymous(ttl_seconds: i64) -> Self {
        Self::new(SessionData::new(), Utc::now() + Duration::seconds(ttl_seconds))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Writes only promote Unchanged; a renewal or destruction already
    // implies persistence.
    fn mark_modified(inner: &mut Inner) {
        if inner.status == SessionStatus::Unchanged {
            inner.status = SessionStatus::Modified;
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    #[must_use]
    pub fn expiry(&self) -> DateTime<Utc> {
        self.lock().expiry
    }

    #[must_use]
    pub fn data_snapshot(&self) -> SessionData {
        self.lock().data.clone()
    }

    /// Authenticated user id, if the session carries a non-zero one.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.lock()
            .data
            .get(KEY_USER_ID)
            .and_then(serde_json::Value::as_i64)
            .filter(|id| *id > 0)
    }

    pub fn set_user_id(&self, id: i64) {
        let mut inner = self.lock();
        inner
            .data
            .insert(KEY_USER_ID.to_string(), serde_json::json!(id));
        Self::mark_modified(&mut inner);
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.lock()
            .data
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    }

    pub fn put_string(&self, key: &str, value: &str) {
        let mut inner = self.lock();
        inner.data.insert(key.to_string(), serde_json::json!(value));
        Self::mark_modified(&mut inner);
    }

    /// One-shot read: removes the key if it was present.
    pub fn pop_string(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let value = inner
            .data
            .remove(key)
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);
        if value.is_some() {
            Self::mark_modified(&mut inner);
        }
        value
    }

    /// Session-bound CSRF token, created on first use.
    #[must_use]
    pub fn csrf_token(&self) -> String {
        let mut inner = self.lock();
        if let Some(token) = inner
            .data
            .get(KEY_CSRF_TOKEN)
            .and_then(serde_json::Value::as_str)
        {
            return token.to_string();
        }

        let token = generate_session_token();
        inner
            .data
            .insert(KEY_CSRF_TOKEN.to_string(), serde_json::json!(token));
        Self::mark_modified(&mut inner);
        token
    }

    /// Rotate the token on privilege change and restart the lifetime.
    pub fn renew(&self, ttl_seconds: i64) {
        let mut inner = self.lock();
        inner.status = SessionStatus::Renewed;
        inner.expiry = Utc::now() + Duration::seconds(ttl_seconds);
    }

    /// Drop the session entirely; the store entry and cookie go with it.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        inner.data.clear();
        inner.status = SessionStatus::Destroyed;
    }
}
