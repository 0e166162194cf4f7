//! Public pages, static assets, and the not-found fallback.

use axum::{
    extract::{Extension, Path, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use tracing::instrument;

use super::chrome;
use crate::snipshare::{
    error::{self, AppError},
    middleware::AuthContext,
    render,
    session::Session,
    state::AppState,
};

#[derive(RustEmbed)]
#[folder = "ui/static/"]
struct StaticAssets;

#[instrument(skip_all)]
pub async fn home(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;
    let chrome = chrome(&session, auth);

    Ok(render::page("Home", &chrome, &render::home_body(&snippets)).into_response())
}

#[instrument(skip_all)]
pub async fn about(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let chrome = chrome(&session, auth);
    render::page("About", &chrome, &render::about_body()).into_response()
}

/// Serve a bundled asset from `/static/*filepath`.
pub async fn static_assets(Path(filepath): Path<String>) -> Response {
    let filepath = filepath.trim_start_matches('/');
    match StaticAssets::get(filepath) {
        Some(file) => {
            let mime = mime_guess::from_path(filepath).first_or_octet_stream();
            ([(CONTENT_TYPE, mime.as_ref())], file.data.into_owned()).into_response()
        }
        None => error::not_found_response(),
    }
}

/// Uniform fallback for unmatched routes.
pub async fn not_found() -> Response {
    error::not_found_response()
}
