use crate::{
    models::key::VariantError,
    services::{image_transformer::TransformError, object_store::StoreError},
};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

/// Seconds a client is told to wait while a worker drains.
pub const RETRY_AFTER_SECS: u64 = 25;

/// Every way a request can end without an object.
///
/// Responses carry the status line only; details go to the log.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("empty request path")]
    EmptyPath,
    #[error(transparent)]
    Variant(#[from] VariantError),
    #[error("`{0}` is not an image")]
    NotAnImage(String),
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("worker is draining")]
    Draining,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::EmptyPath | AppError::NotAnImage(_) => StatusCode::BAD_REQUEST,
            AppError::Variant(err) if err.is_route_miss() => StatusCode::NOT_FOUND,
            AppError::Variant(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Draining => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && !matches!(self, AppError::Draining) {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        if matches!(self, AppError::Draining) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}
