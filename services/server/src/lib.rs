pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod i18n;
pub mod pagination;
pub mod pubsub;
pub mod rate_limiter;
pub mod router;
pub mod user;
pub mod value;
pub mod ws_handler;

use std::sync::Arc;

use axum::routing::get;
use tower_http::trace::TraceLayer;

use hub::Hub;

/// Builds the axum router exposing the WebSocket upgrade endpoint, with
/// the hub as shared state and request tracing layered on top. Callers
/// register their own actions on `hub.router` before accepting traffic.
pub fn build_router(hub: Arc<Hub>) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(ws_handler::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}
