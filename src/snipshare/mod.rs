//! HTTP surface: router, middleware tiers, and the listening server.

pub mod error;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod render;
pub mod session;
pub mod state;

use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::{DefaultOnRequest, TraceLayer},
};
use tracing::{info, info_span, Level, Span};
use ulid::Ulid;

use crate::snipshare::state::AppState;

/// Build the full router.
///
/// Three tiers: the outer chain wraps everything (recovery, logging,
/// security headers); dynamic routes add sessions, CSRF, and authentication
/// derivation; protected routes append the authorization gate.
#[must_use]
pub fn app(state: AppState) -> Router {
    let dynamic = Router::new()
        .route("/", get(handlers::pages::home))
        .route("/about", get(handlers::pages::about))
        .route("/snippet/view/:id", get(handlers::snippets::view))
        .route(
            "/user/signup",
            get(handlers::users::signup_form).post(handlers::users::signup),
        )
        .route(
            "/user/login",
            get(handlers::users::login_form).post(handlers::users::login),
        )
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), middleware::load_session))
                .layer(from_fn(middleware::csrf_protect))
                .layer(from_fn_with_state(state.clone(), middleware::authenticate)),
        );

    let protected = Router::new()
        .route(
            "/snippet/create",
            get(handlers::snippets::create_form).post(handlers::snippets::create),
        )
        .route("/user/logout", post(handlers::users::logout))
        .route("/account/view", get(handlers::account::view))
        .route(
            "/account/password/update",
            get(handlers::account::password_form).post(handlers::account::password_update),
        )
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), middleware::load_session))
                .layer(from_fn(middleware::csrf_protect))
                .layer(from_fn_with_state(state.clone(), middleware::authenticate))
                .layer(from_fn(middleware::require_authentication)),
        );

    Router::new()
        .merge(dynamic)
        .merge(protected)
        .route("/static/*filepath", get(handlers::pages::static_assets))
        .fallback(handlers::pages::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(middleware::recover_panic))
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_span)
                        .on_request(DefaultOnRequest::new().level(Level::INFO)),
                )
                .layer(from_fn(middleware::secure_headers)),
        )
        .with_state(state)
}

/// Start the listening server.
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let app = app(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let remote = request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.to_string());
    let version = format!("{:?}", request.version());
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none")
        .to_string();

    info_span!("http-request", remote, version, method, uri, request_id)
}
