use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

use ws_protocol::Envelope;
use ws_ui_log::RecentLog;

use crate::dispatcher::dispatch;
use crate::hub::{Hub, HubEvent};
use crate::rate_limiter::RateLimiter;
use crate::user::User;
use crate::value::Value;

/// One live WebSocket connection and its per-connection state. Owns the
/// send channel and request queue; the read/write/request tasks are the
/// only code that ever touches the underlying socket halves.
pub struct Client {
    pub client_id: String,
    pub once_id: String,
    pub endpoint: String,
    pub ip_address: String,
    pub ip_port: String,
    pub connection_time: DateTime<Utc>,

    pub app_id: RwLock<String>,
    pub auth_code: RwLock<String>,
    pub language: RwLock<String>,
    pub user: RwLock<Option<Arc<User>>>,
    pub is_login: AtomicBool,

    pub last_request_time: RwLock<Option<DateTime<Utc>>>,
    pub last_heartbeat_time: RwLock<Option<DateTime<Utc>>>,

    closed: AtomicBool,
    disconnecting: AtomicBool,

    // `None` once `close()` has run: dropping the only sender closes the
    // channel so the write task's `recv()` drains what's queued and then
    // returns `None`, terminating it — this is the "send channel closed
    // exactly once" invariant.
    send_tx: std::sync::Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    request_tx: mpsc::Sender<String>,

    pub rate_limiter: RateLimiter,
    pub recent_log: RecentLog,
    keys: RwLock<HashMap<String, Value>>,

    hub: Arc<Hub>,
}

impl Client {
    fn build(
        hub: Arc<Hub>,
        endpoint: String,
        ip_address: String,
        ip_port: String,
    ) -> (Arc<Client>, mpsc::Receiver<Vec<u8>>, mpsc::Receiver<String>) {
        let send_capacity = hub.config().send_channel_capacity;
        let request_capacity = hub.config().request_queue_capacity;
        let recent_log_capacity = hub.config().recent_log_capacity;

        let (send_tx, send_rx) = mpsc::channel::<Vec<u8>>(send_capacity);
        let (request_tx, request_rx) = mpsc::channel::<String>(request_capacity);

        let client = Arc::new(Client {
            client_id: uuid_like(),
            once_id: uuid_like(),
            endpoint,
            ip_address,
            ip_port,
            connection_time: Utc::now(),
            app_id: RwLock::new(String::new()),
            auth_code: RwLock::new(String::new()),
            language: RwLock::new(hub.config().default_language.clone()),
            user: RwLock::new(None),
            is_login: AtomicBool::new(false),
            last_request_time: RwLock::new(None),
            last_heartbeat_time: RwLock::new(None),
            closed: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            send_tx: std::sync::Mutex::new(Some(send_tx)),
            request_tx,
            rate_limiter: RateLimiter::new(
                hub.config().rate_limiter_rate_per_sec,
                hub.config().rate_limiter_burst,
            ),
            recent_log: RecentLog::new(recent_log_capacity),
            keys: RwLock::new(HashMap::new()),
            hub: hub.clone(),
        });

        (client, send_rx, request_rx)
    }

    /// Builds a standalone `Client` with no socket and no spawned tasks,
    /// for tests that need a real `Client` to hand to `Context`/`Hub` APIs.
    /// The returned receivers just need to stay alive for the channels to
    /// behave normally; most tests can drop them immediately.
    #[cfg(test)]
    pub fn new_for_test(hub: Arc<Hub>) -> (Arc<Client>, mpsc::Receiver<Vec<u8>>, mpsc::Receiver<String>) {
        Client::build(hub, "test".to_owned(), "127.0.0.1".to_owned(), "0".to_owned())
    }

    /// Accepts a freshly upgraded socket, registers with the hub, and
    /// spawns the three cooperating tasks (read, request, write). Returns
    /// once the connection has fully torn down.
    pub async fn serve(
        socket: WebSocket,
        hub: Arc<Hub>,
        endpoint: String,
        ip_address: String,
        ip_port: String,
    ) {
        let (client, send_rx, request_rx) =
            Client::build(hub.clone(), endpoint, ip_address, ip_port);

        client.recent_log.push("--", "connection");
        hub.notify(HubEvent::Connection(client.clone())).await;

        let (sink, stream) = socket.split();

        let read_handle = tokio::spawn(read_task(client.clone(), stream));
        let request_handle = tokio::spawn(request_task(client.clone(), request_rx));
        let write_handle = tokio::spawn(write_task(
            client.clone(),
            sink,
            send_rx,
            hub.config().heartbeat_interval,
        ));

        // Any one task exiting means the connection is over; the others
        // exit on their own once the client is closed/disconnecting.
        tokio::select! {
            _ = read_handle => {},
            _ = request_handle => {},
            _ = write_handle => {},
        }

        hub.notify(HubEvent::Disconnect(client.clone())).await;
    }

    /// Non-blocking enqueue. Never panics: a send to a full or already-
    /// closed channel just returns `Err`, which is logged and dropped —
    /// the write task (or its absence) is the actual disconnect signal,
    /// observed by `Client::serve`'s `select!` once that task exits.
    pub fn send_msg(&self, bytes: Vec<u8>) {
        let sender = self.send_tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        match sender {
            Some(tx) => {
                if tx.try_send(bytes).is_err() {
                    self.recent_log.push("--", "slow consumer or closed channel, dropping message");
                }
            }
            None => self.recent_log.push("--", "send on closed client, dropping message"),
        }
    }

    pub fn send_action_msg(&self, envelope: &Envelope) {
        self.send_msg(envelope.encode());
    }

    /// Backpressures the read task rather than dropping: a full request
    /// queue means the client is producing faster than its own handlers
    /// can keep up, and briefly stalling reads on this one connection is
    /// preferable to silently discarding a message it sent.
    async fn push_request(&self, raw: String) {
        if self.request_tx.send(raw).await.is_err() {
            self.recent_log.push("--", "request queue closed, dropping message");
        }
    }

    /// Idempotent: closing twice is a no-op after the first call. Drops
    /// the send channel's only `Sender`, which closes it for the write
    /// task exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send_tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        self.recent_log.push("--", "closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_disconnecting(&self) {
        self.disconnecting.store(true, Ordering::SeqCst);
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst)
    }

    pub fn log(&self, symbol: &str, msg: impl std::fmt::Display) {
        self.recent_log.push(symbol, msg);
    }

    pub fn recent_logs(&self) -> Vec<String> {
        self.recent_log.snapshot()
    }

    pub async fn set_key(&self, key: impl Into<String>, value: Value) {
        self.keys.write().await.insert(key.into(), value);
    }

    pub async fn get_key(&self, key: &str) -> Value {
        self.keys
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_else(Value::none)
    }

    pub async fn user(&self) -> Option<Arc<User>> {
        self.user.read().await.clone()
    }

    pub async fn set_user(&self, user: Option<Arc<User>>) {
        *self.user.write().await = user;
    }

    pub async fn is_login(&self) -> bool {
        self.is_login.load(Ordering::SeqCst)
    }

    pub fn set_login(&self, value: bool) {
        self.is_login.store(value, Ordering::SeqCst);
    }

    pub async fn app_id(&self) -> String {
        self.app_id.read().await.clone()
    }

    pub async fn set_app_id(&self, app_id: impl Into<String>) {
        *self.app_id.write().await = app_id.into();
    }

    pub async fn touch_heartbeat(&self) {
        *self.last_heartbeat_time.write().await = Some(Utc::now());
    }

    pub async fn language(&self) -> String {
        self.language.read().await.clone()
    }

    pub async fn set_language(&self, language: impl Into<String>) {
        *self.language.write().await = language.into();
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }
}

async fn read_task(
    client: Arc<Client>,
    mut stream: futures_util::stream::SplitStream<WebSocket>,
) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                client.push_request(text.to_string()).await;
            }
            Some(Ok(Message::Ping(_))) => {
                // Axum answers pings with pongs automatically; nothing to do.
            }
            Some(Ok(Message::Close(_))) | None => {
                client.log("--", "read loop: connection closed");
                break;
            }
            Some(Ok(_)) => {
                // Binary/pong frames are not part of the wire protocol.
            }
            Some(Err(err)) => {
                client.log("--", format!("read error: {err}"));
                break;
            }
        }
    }
}

async fn request_task(client: Arc<Client>, mut request_rx: mpsc::Receiver<String>) {
    while let Some(raw) = request_rx.recv().await {
        dispatch(&client, &raw).await;
    }
}

async fn write_task(
    client: Arc<Client>,
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    heartbeat_interval: std::time::Duration,
) {
    let mut ticker = interval(heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                match msg {
                    Some(bytes) => {
                        if sink.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into())).await.is_err() {
                            break;
                        }
                        if client.is_disconnecting() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                client.touch_heartbeat().await;
                if let Some(user) = client.user().await {
                    user.touch_heartbeat().await;
                }
            }
        }
    }

    let _ = sink.close().await;
}

fn uuid_like() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let closed = AtomicBool::new(false);
        assert!(!closed.swap(true, Ordering::SeqCst));
        assert!(closed.swap(true, Ordering::SeqCst));
    }
}
