//! HTTP handler for the single catch-all route.
//! Streams direct hits without buffering and delegates the lookup/generate
//! flow to `GatewayService`.

use crate::{
    errors::AppError,
    models::object::{ServedBody, ServedObject},
    runtime::drain::DrainController,
    services::gateway_service::GatewayService,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Shared per-worker state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayService>,
    pub drain: DrainController,
}

impl AppState {
    pub fn new(gateway: GatewayService, drain: DrainController) -> Self {
        Self {
            gateway: Arc::new(gateway),
            drain,
        }
    }
}

/// Any method, any path: serve the object or variant named by the path.
pub async fn serve_object(State(state): State<AppState>, uri: Uri) -> Result<Response, AppError> {
    if state.drain.is_draining() {
        return Err(AppError::Draining);
    }

    let path = uri.path().strip_prefix('/').unwrap_or(uri.path());
    let span = tracing::info_span!("request", request_id = %Uuid::new_v4(), path);

    let served = state.gateway.fetch(path).instrument(span).await?;
    Ok(object_response(served))
}

fn object_response(served: ServedObject) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &served);
    *response.body_mut() = match served.body {
        ServedBody::Stream(stream) => Body::from_stream(stream),
        ServedBody::Full(bytes) => Body::from(bytes),
    };
    response
}

fn set_object_headers(headers: &mut HeaderMap, served: &ServedObject) {
    if let Some(value) = served
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    if let Some(length) = served.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    if let Some(value) = served
        .etag
        .as_deref()
        .and_then(|etag| HeaderValue::from_str(etag).ok())
    {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&served.cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}
