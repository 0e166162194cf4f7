//! Application error boundary.
//!
//! Unexpected failures are logged with full detail server side and rendered
//! as a generic 500; the client never sees the cause. Expected conditions
//! (missing records) get the 404 page through the same rendering path.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ModelError;
use crate::snipshare::render::{self, Chrome};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NoRecord => Self::NotFound,
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => not_found_response(),
            Self::Internal(err) => {
                error!("internal error: {err:#}");
                server_error_response()
            }
        }
    }
}

#[must_use]
pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        render::page("Page not found", &Chrome::default(), &render::not_found_body()),
    )
        .into_response()
}

#[must_use]
pub fn server_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        render::page("Server error", &Chrome::default(), &render::server_error_body()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_record_maps_to_not_found() {
        let err: AppError = ModelError::NoRecord.into();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_errors_map_to_generic_500() {
        let err: AppError = ModelError::InvalidCredentials.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
