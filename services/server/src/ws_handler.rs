use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use crate::client::Client;
use crate::hub::Hub;

/// Accepts the upgrade and hands the socket straight to `Client::serve`.
/// No auth happens here: every connection starts as a guest, and logging
/// in is just another registered action dispatched over the socket like
/// any other — keeping this handler, and the core it sits in front of,
/// free of any particular credential scheme.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ip_address = resolve_ip(&headers, addr);
    let ip_port = addr.port().to_string();

    ws.on_upgrade(move |socket| async move {
        Client::serve(socket, hub, "/ws".to_owned(), ip_address, ip_port).await;
    })
}

/// Resolution order: `X-Forwarded-For` (first hop) → `X-Real-IP` → the
/// socket's own peer address, matching the original's reverse-proxy-aware
/// client IP resolution.
fn resolve_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(candidate) = value.split(',').next().map(str::trim) {
            if !candidate.is_empty() {
                return candidate.to_owned();
            }
        }
    }

    if let Some(value) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let candidate = value.trim();
        if !candidate.is_empty() {
            return candidate.to_owned();
        }
    }

    addr.ip().to_string()
}
