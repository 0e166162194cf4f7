//! End-to-end tests driving the full middleware chain and handlers against
//! in-memory stores.

use axum::{
    body::Body,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use snipshare::models::mem::{MemSessionStore, MemSnippetStore, MemUserStore};
use snipshare::models::UserStore;
use snipshare::snipshare::{
    app,
    state::{AppConfig, AppState},
};

const COOKIE_NAME: &str = "snipshare_session";

struct TestApp {
    router: Router,
    users: Arc<MemUserStore>,
    sessions: Arc<MemSessionStore>,
}

fn test_app() -> TestApp {
    let users = Arc::new(MemUserStore::new());
    let snippets = Arc::new(MemSnippetStore::new());
    let sessions = Arc::new(MemSessionStore::new());

    let state = AppState::new(
        users.clone(),
        snippets,
        sessions.clone(),
        AppConfig::new().with_cookie_secure(false),
    );

    TestApp {
        router: app(state),
        users,
        sessions,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

fn get_request(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(path: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Session cookie pair (`name=value`) set on the response, if any.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.starts_with(COOKIE_NAME) && !value.contains("Max-Age=0"))
        .map(|value| value.split(';').next().unwrap_or_default().to_string())
        .next()
}

fn cookie_was_cleared(response: &Response) -> bool {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(COOKIE_NAME) && value.contains("Max-Age=0"))
}

/// Pull the CSRF token out of a rendered form.
fn csrf_token(body: &str) -> String {
    let marker = r#"name="csrf_token" value=""#;
    let start = body.find(marker).expect("form has no csrf token") + marker.len();
    let end = body[start..].find('"').expect("unterminated csrf value");
    body[start..start + end].to_string()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn assert_security_headers(response: &Response) {
    for name in [
        "content-security-policy",
        "referrer-policy",
        "x-content-type-options",
        "x-frame-options",
        "x-xss-protection",
    ] {
        assert!(
            response.headers().contains_key(name),
            "response is missing {name}"
        );
    }
    assert_eq!(
        response.headers().get("x-xss-protection").unwrap(),
        &axum::http::HeaderValue::from_static("0")
    );
}

/// Start a session, log in with the given credentials, and return the
/// post-login cookie.
async fn log_in(app: &TestApp, email: &str, password: &str) -> String {
    let response = send(app, get_request("/user/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("login page set no session cookie");
    let token = csrf_token(&body_string(response).await);

    let response = send(
        app,
        post_form(
            "/user/login",
            Some(&cookie),
            &[
                ("email", email),
                ("password", password),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    session_cookie(&response).expect("login set no session cookie")
}

#[tokio::test]
async fn all_responses_carry_security_headers() {
    let app = test_app();

    let ok = send(&app, get_request("/", None)).await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_security_headers(&ok);

    let not_found = send(&app, get_request("/definitely/not/here", None)).await;
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
    assert_security_headers(&not_found);

    let missing_asset = send(&app, get_request("/static/css/missing.css", None)).await;
    assert_eq!(missing_asset.status(), StatusCode::NOT_FOUND);
    assert_security_headers(&missing_asset);
}

#[tokio::test]
async fn home_and_about_render() {
    let app = test_app();

    let home = send(&app, get_request("/", None)).await;
    assert_eq!(home.status(), StatusCode::OK);
    assert!(body_string(home).await.contains("Latest Snippets"));

    let about = send(&app, get_request("/about", None)).await;
    assert_eq!(about.status(), StatusCode::OK);
}

#[tokio::test]
async fn static_assets_are_served() {
    let app = test_app();

    let response = send(&app, get_request("/static/css/main.css", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/css"));
}

#[tokio::test]
async fn missing_or_malformed_snippet_ids_are_404() {
    let app = test_app();

    for path in ["/snippet/view/999", "/snippet/view/abc", "/snippet/view/0"] {
        let response = send(&app, get_request(path, None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "path {path}");
    }
}

#[tokio::test]
async fn protected_routes_redirect_anonymous_users() {
    let app = test_app();

    for path in [
        "/snippet/create",
        "/account/view",
        "/account/password/update",
    ] {
        let response = send(&app, get_request(path, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "path {path}");
        assert_eq!(location(&response), "/user/login");
    }
}

#[tokio::test]
async fn csrf_is_required_before_the_handler_runs() {
    let app = test_app();

    let response = send(&app, get_request("/user/signup", None)).await;
    let cookie = session_cookie(&response).unwrap();

    // Missing token.
    let response = send(
        &app,
        post_form(
            "/user/signup",
            Some(&cookie),
            &[
                ("name", "Alice"),
                ("email", "alice@x.com"),
                ("password", "pw123456"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Mismatched token.
    let response = send(
        &app,
        post_form(
            "/user/signup",
            Some(&cookie),
            &[
                ("name", "Alice"),
                ("email", "alice@x.com"),
                ("password", "pw123456"),
                ("csrf_token", "forged-token"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The handler never ran: the user was not created.
    assert!(app
        .users
        .authenticate("alice@x.com", "pw123456")
        .await
        .is_err());
}

#[tokio::test]
async fn signup_validation_failures_rerender_with_422() {
    let app = test_app();

    let response = send(&app, get_request("/user/signup", None)).await;
    let cookie = session_cookie(&response).unwrap();
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/user/signup",
            Some(&cookie),
            &[
                ("name", ""),
                ("email", "not-an-email"),
                ("password", "short"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_string(response).await;
    assert!(body.contains("This field cannot be blank"));
    assert!(body.contains("This field must be a valid email address"));
    assert!(body.contains("This field must be at least 8 characters long"));
}

#[tokio::test]
async fn duplicate_email_gets_a_field_specific_message() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();

    let response = send(&app, get_request("/user/signup", None)).await;
    let cookie = session_cookie(&response).unwrap();
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/user/signup",
            Some(&cookie),
            &[
                ("name", "Other Alice"),
                ("email", "alice@x.com"),
                ("password", "pw654321"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_string(response)
        .await
        .contains("Email address is already in use"));
}

#[tokio::test]
async fn login_failure_message_is_identical_for_both_causes() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();

    for (email, password) in [
        ("nobody@x.com", "pw123456"),
        ("alice@x.com", "wrong-password"),
    ] {
        let response = send(&app, get_request("/user/login", None)).await;
        let cookie = session_cookie(&response).unwrap();
        let token = csrf_token(&body_string(response).await);

        let response = send(
            &app,
            post_form(
                "/user/login",
                Some(&cookie),
                &[
                    ("email", email),
                    ("password", password),
                    ("csrf_token", &token),
                ],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_string(response).await;
        assert!(body.contains("Email or password is incorrect"));
    }
}

#[tokio::test]
async fn login_rotates_the_session_token() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();

    let response = send(&app, get_request("/user/login", None)).await;
    let old_cookie = session_cookie(&response).unwrap();
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/user/login",
            Some(&old_cookie),
            &[
                ("email", "alice@x.com"),
                ("password", "pw123456"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let new_cookie = session_cookie(&response).unwrap();
    assert_ne!(new_cookie, old_cookie);

    // The new token is authenticated...
    let response = send(&app, get_request("/snippet/create", Some(&new_cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        &axum::http::HeaderValue::from_static("no-store")
    );

    // ...and the old one no longer resolves a session at all.
    let response = send(&app, get_request("/snippet/create", Some(&old_cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");
}

#[tokio::test]
async fn original_page_round_trips_through_login() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();

    // Anonymous request to a protected page: redirected, destination stored.
    let response = send(&app, get_request("/snippet/create", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");
    let cookie = session_cookie(&response).expect("gate should start a session");

    let response = send(&app, get_request("/user/login", Some(&cookie))).await;
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/user/login",
            Some(&cookie),
            &[
                ("email", "alice@x.com"),
                ("password", "pw123456"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/snippet/create");
}

#[tokio::test]
async fn snippet_create_flow() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();
    let cookie = log_in(&app, "alice@x.com", "pw123456").await;

    let response = send(&app, get_request("/snippet/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/snippet/create",
            Some(&cookie),
            &[
                ("title", "O snail"),
                ("content", "O snail\nClimb Mount Fuji,\nBut slowly, slowly!"),
                ("expires", "7"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let view_path = location(&response).to_string();
    assert!(view_path.starts_with("/snippet/view/"));

    let response = send(&app, get_request(&view_path, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("Climb Mount Fuji"));
    // Flash shows once.
    assert!(body.contains("Snippet successfully created!"));
    let response = send(&app, get_request(&view_path, Some(&cookie))).await;
    assert!(!body_string(response).await.contains("Snippet successfully created!"));
}

#[tokio::test]
async fn snippet_validation_failures_rerender_with_422() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();
    let cookie = log_in(&app, "alice@x.com", "pw123456").await;

    let response = send(&app, get_request("/snippet/create", Some(&cookie))).await;
    let token = csrf_token(&body_string(response).await);

    let long_title = "x".repeat(101);
    let response = send(
        &app,
        post_form(
            "/snippet/create",
            Some(&cookie),
            &[
                ("title", long_title.as_str()),
                ("content", ""),
                ("expires", "2"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_string(response).await;
    assert!(body.contains("This field cannot be more than 100 characters long"));
    assert!(body.contains("This field cannot be blank"));
    assert!(body.contains("This field must equal 1, 7 or 365"));
}

#[tokio::test]
async fn password_update_flow() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();
    let cookie = log_in(&app, "alice@x.com", "pw123456").await;

    let response = send(&app, get_request("/account/password/update", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = csrf_token(&body_string(response).await);

    // Wrong current password: rejected, hash unchanged.
    let response = send(
        &app,
        post_form(
            "/account/password/update",
            Some(&cookie),
            &[
                ("current_password", "wrong-current"),
                ("new_password", "newpw12345"),
                ("confirm_password", "newpw12345"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_string(response)
        .await
        .contains("Current password is incorrect"));
    app.users
        .authenticate("alice@x.com", "pw123456")
        .await
        .unwrap();

    // Correct current password: hash replaced.
    let response = send(
        &app,
        post_form(
            "/account/password/update",
            Some(&cookie),
            &[
                ("current_password", "pw123456"),
                ("new_password", "newpw12345"),
                ("confirm_password", "newpw12345"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/account/view");

    app.users
        .authenticate("alice@x.com", "newpw12345")
        .await
        .unwrap();
    assert!(app
        .users
        .authenticate("alice@x.com", "pw123456")
        .await
        .is_err());
}

#[tokio::test]
async fn account_view_shows_the_logged_in_user() {
    let app = test_app();
    app.users
        .insert("Alice", "alice@x.com", "pw123456")
        .await
        .unwrap();
    let cookie = log_in(&app, "alice@x.com", "pw123456").await;

    let response = send(&app, get_request("/account/view", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("Alice"));
    assert!(body.contains("alice@x.com"));
}

#[tokio::test]
async fn signup_login_logout_scenario() {
    let app = test_app();

    // Signup.
    let response = send(&app, get_request("/user/signup", None)).await;
    let cookie = session_cookie(&response).unwrap();
    let token = csrf_token(&body_string(response).await);

    let response = send(
        &app,
        post_form(
            "/user/signup",
            Some(&cookie),
            &[
                ("name", "Alice"),
                ("email", "alice@x.com"),
                ("password", "pw123456"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    // Login with the same credentials.
    let response = send(&app, get_request("/user/login", Some(&cookie))).await;
    let token = csrf_token(&body_string(response).await);
    let response = send(
        &app,
        post_form(
            "/user/login",
            Some(&cookie),
            &[
                ("email", "alice@x.com"),
                ("password", "pw123456"),
                ("csrf_token", &token),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response).unwrap();

    // Protected page now renders.
    let response = send(&app, get_request("/snippet/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Logout destroys the session and clears the cookie.
    let response = send(&app, get_request("/snippet/create", Some(&cookie))).await;
    let token = csrf_token(&body_string(response).await);
    let response = send(
        &app,
        post_form("/user/logout", Some(&cookie), &[("csrf_token", &token)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(cookie_was_cleared(&response));

    // Back to the gate.
    let response = send(&app, get_request("/snippet/create", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/user/login");

    // The destroyed session's row is gone from the store.
    assert!(app.sessions.is_empty() || app.sessions.len() <= 1);
}
