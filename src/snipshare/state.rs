//! Application state and configuration.
//!
//! Every handler and middleware receives its dependencies through this
//! context object; there are no package-level singletons.

use std::sync::Arc;

use crate::models::{SessionStore, SnippetStore, UserStore};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_COOKIE_NAME: &str = "snipshare_session";

#[derive(Clone, Debug)]
pub struct AppConfig {
    session_ttl_seconds: i64,
    cookie_name: String,
    cookie_secure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure: true,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

/// Shared dependencies, injected into the router.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub snippets: Arc<dyn SnippetStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub config: AppConfig,
}

impl AppState {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        snippets: Arc<dyn SnippetStore>,
        sessions: Arc<dyn SessionStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            users,
            snippets,
            sessions,
            config,
        }
    }
}
