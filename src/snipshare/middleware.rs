//! The request pipeline.
//!
//! Ordering is load-bearing. Outer chain (every request, including the 404
//! fallback and static assets): panic recovery, request logging, security
//! headers. Dynamic chain (per route): session load/save, CSRF protection,
//! authentication derivation, and — for protected routes — the
//! authorization gate.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{
        header::{CACHE_CONTROL, CONNECTION, SET_COOKIE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::any::Any;
use tracing::{debug, error};

use crate::models::ModelError;
use crate::snipshare::{
    error,
    render::{self, Chrome},
    session::{
        self, clear_session_cookie, generate_session_token, hash_session_token, session_cookie,
        Session, SessionStatus, KEY_ORIGINAL_PAGE,
    },
    state::{AppConfig, AppState},
};

const CSRF_FORM_FIELD: &str = "csrf_token";
// Form bodies are buffered for the CSRF check; anything bigger is rejected.
const MAX_FORM_BYTES: usize = 1024 * 1024;

/// The five fixed security headers, applied to every response.
pub fn apply_secure_headers(headers: &mut HeaderMap) {
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(
            "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
        ),
    );
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("deny"));
    headers.insert("x-xss-protection", HeaderValue::from_static("0"));
}

pub async fn secure_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    apply_secure_headers(response.headers_mut());
    response
}

/// Failure boundary for the whole chain. The cause is logged, the client
/// gets the generic 500, and the connection is marked non-reusable.
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "unknown panic".to_string());
    error!("panic while serving request: {detail}");

    let mut response = error::server_error_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    // This response skips the normal header middleware, so apply them here.
    apply_secure_headers(response.headers_mut());
    response
}

/// Load the session for the request and persist it after the handler.
///
/// A missing or unresolvable cookie starts a fresh anonymous session; only a
/// store failure aborts the request.
pub async fn load_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = session::extract_session_token(req.headers(), state.config.cookie_name());

    // Token whose store entry actually resolved; a stale cookie is treated
    // the same as no cookie.
    let mut resolved: Option<String> = None;
    let session = match &presented {
        Some(token) => match state.sessions.load(&hash_session_token(token)).await {
            Ok(Some(record)) => {
                resolved = Some(token.clone());
                Session::new(record.data, record.expiry)
            }
            Ok(None) => Session::anonymous(state.config.session_ttl_seconds()),
            Err(err) => {
                error!("failed to load session: {err}");
                return error::server_error_response();
            }
        },
        None => Session::anonymous(state.config.session_ttl_seconds()),
    };

    req.extensions_mut().insert(session.clone());
    let mut response = next.run(req).await;

    if let Err(err) = persist_session(&state, &session, resolved.as_deref(), &mut response).await {
        error!("failed to persist session: {err}");
        return error::server_error_response();
    }

    response
}

async fn persist_session(
    state: &AppState,
    session: &Session,
    resolved: Option<&str>,
    response: &mut Response,
) -> Result<(), ModelError> {
    let config = &state.config;
    match session.status() {
        SessionStatus::Unchanged => {}
        SessionStatus::Destroyed => {
            if let Some(token) = resolved {
                state.sessions.destroy(&hash_session_token(token)).await?;
            }
            if let Ok(cookie) = clear_session_cookie(config.cookie_name(), config.cookie_secure())
            {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
        }
        SessionStatus::Renewed => {
            // Rotation: the old token stops resolving before the new one is
            // handed to the client.
            let new_token = generate_session_token();
            let new_hash = hash_session_token(&new_token);
            let expiry = session.expiry();
            if let Some(old) = resolved {
                state
                    .sessions
                    .renew(&hash_session_token(old), &new_hash, expiry)
                    .await?;
            }
            state
                .sessions
                .save(&new_hash, &session.data_snapshot(), expiry)
                .await?;
            set_session_cookie(response, config, &new_token, session);
        }
        SessionStatus::Modified => {
            let token = resolved.map_or_else(generate_session_token, ToString::to_string);
            state
                .sessions
                .save(
                    &hash_session_token(&token),
                    &session.data_snapshot(),
                    session.expiry(),
                )
                .await?;
            set_session_cookie(response, config, &token, session);
        }
    }

    Ok(())
}

fn set_session_cookie(response: &mut Response, config: &AppConfig, token: &str, session: &Session) {
    let max_age = (session.expiry() - Utc::now()).num_seconds().max(0);
    if let Ok(cookie) = session_cookie(config.cookie_name(), token, max_age, config.cookie_secure())
    {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
}

fn state_changing(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn form_field(bytes: &[u8], field: &str) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
        .ok()?
        .into_iter()
        .find(|(name, _)| name == field)
        .map(|(_, value)| value)
}

// Compare by digest rather than raw bytes so the comparison time does not
// depend on where the tokens diverge.
fn tokens_match(supplied: &str, expected: &str) -> bool {
    Sha256::digest(supplied.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Issue the session-bound CSRF token and, on state-changing methods,
/// require it as a form field before the handler runs.
pub async fn csrf_protect(req: Request, next: Next) -> Response {
    let Some(session) = req.extensions().get::<Session>().cloned() else {
        error!("csrf middleware ran without a session");
        return error::server_error_response();
    };

    // Get-or-create on every request so forms can always embed it.
    let expected = session.csrf_token();

    if !state_changing(req.method()) {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("rejecting unreadable form body: {err}");
            return (
                StatusCode::BAD_REQUEST,
                render::page("Bad request", &Chrome::default(), &render::forbidden_body()),
            )
                .into_response();
        }
    };

    let supplied = form_field(&bytes, CSRF_FORM_FIELD);
    if !supplied
        .as_deref()
        .is_some_and(|token| tokens_match(token, &expected))
    {
        // Expected condition: rejected, not logged as a server error.
        debug!("csrf token missing or mismatched");
        return (
            StatusCode::FORBIDDEN,
            render::page("Forbidden", &Chrome::default(), &render::forbidden_body()),
        )
            .into_response();
    }

    // Hand the buffered body back to the form extractor.
    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}

/// Typed, request-scoped authentication state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthContext {
    user_id: Option<i64>,
}

impl AuthContext {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }
}

/// Derive the request's authentication state from the session.
///
/// A session id is only trusted after the credential store confirms the user
/// still exists; a stale id downgrades the request to anonymous.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(session) = req.extensions().get::<Session>().cloned() else {
        error!("authentication middleware ran without a session");
        return error::server_error_response();
    };

    let context = match session.user_id() {
        None => AuthContext::anonymous(),
        Some(id) => match state.users.exists(id).await {
            Ok(true) => AuthContext::authenticated(id),
            Ok(false) => AuthContext::anonymous(),
            Err(err) => {
                error!("failed to check user existence: {err}");
                return error::server_error_response();
            }
        },
    };

    req.extensions_mut().insert(context);
    next.run(req).await
}

/// Authorization gate for protected routes: unauthenticated requests are
/// redirected to login with their destination remembered for afterwards.
pub async fn require_authentication(req: Request, next: Next) -> Response {
    let authenticated = req
        .extensions()
        .get::<AuthContext>()
        .is_some_and(AuthContext::is_authenticated);

    if !authenticated {
        if let Some(session) = req.extensions().get::<Session>() {
            session.put_string(KEY_ORIGINAL_PAGE, req.uri().path());
        }
        return Redirect::to("/user/login").into_response();
    }

    let mut response = next.run(req).await;
    // Protected pages must not be cached.
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
