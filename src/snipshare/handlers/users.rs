//! Signup, login, and logout.

use axum::{
    extract::{Extension, Form, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;

use super::chrome;
use crate::models::ModelError;
use crate::snipshare::{
    error::AppError,
    forms::{self, FieldErrors, LoginForm, SignupForm},
    middleware::AuthContext,
    render,
    session::{Session, KEY_FLASH, KEY_ORIGINAL_PAGE},
    state::AppState,
};

const MIN_PASSWORD_CHARS: usize = 8;

#[instrument(skip_all)]
pub async fn signup_form(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let chrome = chrome(&session, auth);
    let body = render::signup_body(&chrome.csrf_token, "", "", &FieldErrors::default());

    render::page("Signup", &chrome, &body).into_response()
}

fn signup_retry(
    session: &Session,
    auth: AuthContext,
    form: &SignupForm,
    errors: &FieldErrors,
) -> Response {
    let chrome = chrome(session, auth);
    let body = render::signup_body(&chrome.csrf_token, &form.name, &form.email, errors);

    (
        StatusCode::UNPROCESSABLE_ENTITY,
        render::page("Signup", &chrome, &body),
    )
        .into_response()
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let mut errors = FieldErrors::default();
    errors.check(forms::not_blank(&form.name), "name", "This field cannot be blank");
    errors.check(forms::not_blank(&form.email), "email", "This field cannot be blank");
    errors.check(
        forms::valid_email(&form.email),
        "email",
        "This field must be a valid email address",
    );
    errors.check(
        forms::min_chars(&form.password, MIN_PASSWORD_CHARS),
        "password",
        "This field must be at least 8 characters long",
    );

    if !errors.is_empty() {
        return Ok(signup_retry(&session, auth, &form, &errors));
    }

    match state
        .users
        .insert(&form.name, &form.email, &form.password)
        .await
    {
        Ok(_) => {}
        Err(ModelError::DuplicateEmail) => {
            errors.add("email", "Email address is already in use");
            return Ok(signup_retry(&session, auth, &form, &errors));
        }
        Err(err) => return Err(err.into()),
    }

    session.put_string(KEY_FLASH, "Your signup was successful. Please log in.");

    Ok(Redirect::to("/user/login").into_response())
}

#[instrument(skip_all)]
pub async fn login_form(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    let chrome = chrome(&session, auth);
    let body = render::login_body(&chrome.csrf_token, "", &FieldErrors::default());

    render::page("Login", &chrome, &body).into_response()
}

fn login_retry(
    session: &Session,
    auth: AuthContext,
    form: &LoginForm,
    errors: &FieldErrors,
) -> Response {
    let chrome = chrome(session, auth);
    let body = render::login_body(&chrome.csrf_token, &form.email, errors);

    (
        StatusCode::UNPROCESSABLE_ENTITY,
        render::page("Login", &chrome, &body),
    )
        .into_response()
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(auth): Extension<AuthContext>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let mut errors = FieldErrors::default();
    errors.check(forms::not_blank(&form.email), "email", "This field cannot be blank");
    errors.check(
        forms::valid_email(&form.email),
        "email",
        "This field must be a valid email address",
    );
    errors.check(
        forms::not_blank(&form.password),
        "password",
        "This field cannot be blank",
    );

    if !errors.is_empty() {
        return Ok(login_retry(&session, auth, &form, &errors));
    }

    let id = match state.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(ModelError::InvalidCredentials) => {
            // One message for both unknown email and wrong password.
            errors.add_non_field("Email or password is incorrect");
            return Ok(login_retry(&session, auth, &form, &errors));
        }
        Err(err) => return Err(err.into()),
    };

    // Privilege change: rotate the session token before marking it
    // authenticated, so a pre-login token cannot be fixated.
    session.renew(state.config.session_ttl_seconds());
    session.set_user_id(id);

    let destination = session
        .pop_string(KEY_ORIGINAL_PAGE)
        .unwrap_or_else(|| "/snippet/create".to_string());

    Ok(Redirect::to(&destination).into_response())
}

#[instrument(skip_all)]
pub async fn logout(Extension(session): Extension<Session>) -> Response {
    // Token invalidated and store entry removed; the cookie is expired by
    // the session middleware.
    session.destroy();

    Redirect::to("/").into_response()
}
