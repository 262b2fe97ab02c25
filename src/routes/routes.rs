//! Defines the gateway's only route.
//!
//! Every method and every path lands on `serve_object`: the path (without
//! its leading `/`) is the object key, or `{key}/{width|height}/{size}` for a
//! resized variant. Nested keys like `photos/2025/img.jpg` are supported.

use crate::handlers::gateway_handlers::{AppState, serve_object};
use axum::Router;

/// Build the router. It carries `AppState` to the handler.
pub fn routes() -> Router<AppState> {
    Router::new().fallback(serve_object)
}
