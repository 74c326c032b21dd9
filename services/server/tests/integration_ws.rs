use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hub_server::build_router;
use hub_server::config::HubConfig;
use hub_server::hub::Hub;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_test_hub() -> (SocketAddr, Arc<Hub>) {
    let mut config = HubConfig::default();
    config.bind_addr = "127.0.0.1:0".to_owned();
    let hub = Hub::new(config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = build_router(hub.clone()).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, hub)
}

#[tokio::test]
async fn ping_round_trips_over_a_real_socket() {
    let (addr, _hub) = spawn_test_hub().await;
    let url = format!("ws://{addr}/ws");

    let (mut socket, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();

    socket
        .send(Message::Text(r#"{"action":"ping"}"#.into()))
        .await
        .unwrap();

    let reply = socket.next().await.unwrap().unwrap();
    let text = reply.into_text().unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(envelope["action"], "ping");
    assert_eq!(envelope["msg"], "pong");
}

#[tokio::test]
async fn unregistered_action_gets_not_found_response() {
    let (addr, _hub) = spawn_test_hub().await;
    let url = format!("ws://{addr}/ws");

    let (mut socket, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();

    socket
        .send(Message::Text(r#"{"action":"no.such.action"}"#.into()))
        .await
        .unwrap();

    let reply = socket.next().await.unwrap().unwrap();
    let text = reply.into_text().unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(envelope["code"], -1005);
}

#[tokio::test]
async fn bursting_past_the_rate_limit_gets_throttled() {
    let mut config = HubConfig::default();
    config.bind_addr = "127.0.0.1:0".to_owned();
    config.rate_limiter_burst = 2;
    config.rate_limiter_rate_per_sec = 1.0;
    let hub = Hub::new(config);

    let echo: hub_server::router::HandlerFunc = Arc::new(|ctx: &mut hub_server::context::Context| {
        Box::pin(async move { ctx.send_ok() })
    });
    hub.router.add("echo", vec![echo]).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(hub).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = format!("ws://{addr}/ws");
    let (mut socket, _response) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // Ping never touches the rate limiter: the heartbeat action must
    // bypass it entirely, so it stays off the rate limiter's budget.
    for _ in 0..2 {
        socket
            .send(Message::Text(r#"{"action":"echo"}"#.into()))
            .await
            .unwrap();
        let reply = socket.next().await.unwrap().unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&reply.into_text().unwrap()).unwrap();
        assert_eq!(envelope["action"], "echo");
    }

    socket
        .send(Message::Text(r#"{"action":"echo"}"#.into()))
        .await
        .unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    let envelope: serde_json::Value = serde_json::from_str(&reply.into_text().unwrap()).unwrap();
    assert_eq!(envelope["action"], "sys.rateLimit");
    assert_eq!(envelope["code"], -1003);
}
