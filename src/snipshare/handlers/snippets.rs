//! Snippet viewing and creation.

use axum::{
    extract::{Extension, Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;

use super::chrome;
use crate::snipshare::{
    error::AppError,
    forms::{self, FieldErrors, SnippetForm},
    middleware::AuthContext,
    render,
    session::{Session, KEY_FLASH},
    state::AppState,
};

const EXPIRES_CHOICES: [i64; 3] = [1, 7, 365];
const DEFAULT_EXPIRES_DAYS: i64 = 365;
const MAX_TITLE_CHARS: usize = 100;

#[instrument(skip_all, fields(id))]
pub async fn view(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    // Non-numeric or non-positive ids are a 404, not a client error page.
    let id: i64 = id.parse().map_err(|_| AppError::NotFound)?;
    if id < 1 {
        return Err(AppError::NotFound);
    }

    let snippet = state.snippets.get(id).await?;
    let chrome = chrome(&session, auth);

    let body = render::snippet_body(&snippet);

    Ok(render::page(&snippet.title, &chrome, &body).into_response())
}

#[instrument(skip_all)]
pub async fn create_form(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let chrome = chrome(&session, auth);
    let body = render::snippet_form_body(
        &chrome.csrf_token,
        "",
        "",
        DEFAULT_EXPIRES_DAYS,
        &FieldErrors::default(),
    );

    render::page("Create snippet", &chrome, &body).into_response()
}

#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    Form(form): Form<SnippetForm>,
) -> Result<Response, AppError> {
    let expires: i64 = form.expires.trim().parse().unwrap_or(0);

    let mut errors = FieldErrors::default();
    errors.check(forms::not_blank(&form.title), "title", "This field cannot be blank");
    errors.check(
        forms::max_chars(&form.title, MAX_TITLE_CHARS),
        "title",
        "This field cannot be more than 100 characters long",
    );
    errors.check(
        forms::not_blank(&form.content),
        "content",
        "This field cannot be blank",
    );
    errors.check(
        forms::permitted(expires, &EXPIRES_CHOICES),
        "expires",
        "This field must equal 1, 7 or 365",
    );

    if !errors.is_empty() {
        let chrome = chrome(&session, auth);
        let body = render::snippet_form_body(
            &chrome.csrf_token,
            &form.title,
            &form.content,
            expires,
            &errors,
        );
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            render::page("Create snippet", &chrome, &body),
        )
            .into_response());
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, expires)
        .await?;

    session.put_string(KEY_FLASH, "Snippet successfully created!");

    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}
