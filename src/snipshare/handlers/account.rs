//! Account view and password update.

use axum::{
    extract::{Extension, Form, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use anyhow::anyhow;
use tracing::instrument;

use super::chrome;
use crate::models::ModelError;
use crate::snipshare::{
    error::AppError,
    forms::{self, FieldErrors, PasswordForm},
    middleware::AuthContext,
    render,
    session::{Session, KEY_FLASH},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;

// The authorization gate runs before these handlers; a missing id here
// means the chain is miswired, not that the user is logged out.
fn current_user_id(auth: AuthContext) -> Result<i64, AppError> {
    auth.user_id()
        .ok_or_else(|| AppError::Internal(anyhow!("protected handler without authenticated user")))
}

#[instrument(skip_all)]
pub async fn view(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Response, AppError> {
    let id = current_user_id(auth)?;
    let user = state.users.get(id).await?;
    let chrome = chrome(&session, auth);

    Ok(render::page("Your account", &chrome, &render::account_body(&user)).into_response())
}

#[instrument(skip_all)]
pub async fn password_form(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let chrome = chrome(&session, auth);
    let body = render::password_form_body(&chrome.csrf_token, &FieldErrors::default());

    render::page("Change password", &chrome, &body).into_response()
}

fn password_retry(session: &Session, auth: AuthContext, errors: &FieldErrors) -> Response {
    let chrome = chrome(session, auth);
    let body = render::password_form_body(&chrome.csrf_token, errors);

    (
        StatusCode::UNPROCESSABLE_ENTITY,
        render::page("Change password", &chrome, &body),
    )
        .into_response()
}

#[instrument(skip_all)]
pub async fn password_update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    Form(form): Form<PasswordForm>,
) -> Result<Response, AppError> {
    let id = current_user_id(auth)?;

    let mut errors = FieldErrors::default();
    errors.check(
        forms::not_blank(&form.current_password),
        "current_password",
        "This field cannot be blank",
    );
    errors.check(
        forms::min_chars(&form.new_password, MIN_PASSWORD_CHARS),
        "new_password",
        "This field must be at least 8 characters long",
    );
    errors.check(
        form.new_password == form.confirm_password,
        "confirm_password",
        "Passwords do not match",
    );

    if !errors.is_empty() {
        return Ok(password_retry(&session, auth, &errors));
    }

    match state
        .users
        .update_password(id, &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {}
        Err(ModelError::InvalidCredentials) => {
            errors.add("current_password", "Current password is incorrect");
            return Ok(password_retry(&session, auth, &errors));
        }
        Err(err) => return Err(err.into()),
    }

    session.put_string(KEY_FLASH, "Your password has been updated.");

    Ok(Redirect::to("/account/view").into_response())
}
