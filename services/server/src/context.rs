use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use ws_protocol::Envelope;

use crate::client::Client;
use crate::hub::Hub;
use crate::pagination::Pagination;
use crate::pubsub::TopicHandler;
use crate::router::HandlersChain;

/// Set by `Context::abort`; chosen far beyond any realistic handler-chain
/// length so normal chains never collide with it, matching the original's
/// sentinel-index abort convention.
const ABORT_INDEX: i32 = i32::MAX / 2;

/// Per-request state threaded through a single action's handler chain.
/// Constructed fresh by the dispatcher for every inbound envelope and
/// dropped once the chain finishes; nothing here outlives one request.
pub struct Context {
    pub client: Arc<Client>,
    pub hub: Arc<Hub>,
    pub action: String,
    pub params: serde_json::Value,
    pub language: String,
    pub default_language: String,
    pub connection_time: DateTime<Utc>,
    pub request_at: DateTime<Utc>,

    response: Option<Envelope>,
    index: i32,
    handlers: HandlersChain,
    logs: Vec<String>,
}

impl Context {
    pub fn new(
        client: Arc<Client>,
        hub: Arc<Hub>,
        action: String,
        params: serde_json::Value,
        language: String,
        default_language: String,
        handlers: HandlersChain,
    ) -> Self {
        let connection_time = client.connection_time;
        Self {
            client,
            hub,
            action,
            params,
            language,
            default_language,
            connection_time,
            request_at: Utc::now(),
            response: None,
            index: -1,
            handlers,
            logs: Vec::new(),
        }
    }

    /// Runs the remaining handlers in the chain, in order. A handler that
    /// wants to delegate to the rest of the chain calls `ctx.next()` itself
    /// (gin-style middleware); one that doesn't simply returns, and the
    /// loop below advances past it once its future resolves.
    pub fn next(&mut self) -> futures_util::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            self.index += 1;
            while (self.index as usize) < self.handlers.len() {
                let handler = self.handlers[self.index as usize].clone();
                handler(self).await;
                self.index += 1;
            }
        })
    }

    /// Stops the chain: no handler after the current one will run, even if
    /// it later calls `next()`.
    pub fn abort(&mut self) {
        self.index = ABORT_INDEX;
    }

    pub fn is_aborted(&self) -> bool {
        self.index >= ABORT_INDEX
    }

    // ---- response -----------------------------------------------------

    pub fn has_responded(&self) -> bool {
        self.response.is_some()
    }

    pub fn take_response(&mut self) -> Option<Envelope> {
        self.response.take()
    }

    pub fn send(&mut self, data: serde_json::Value) {
        self.send_envelope(Envelope::new(&self.action).with_data(data));
    }

    pub fn send_ok(&mut self) {
        self.send_envelope(Envelope::new(&self.action));
    }

    /// Mirrors the original's dev-mode i18n write-through: the translation
    /// lookup (and, in dev mode, the write-back of untranslated strings) is
    /// keyed by this action, this numeric code, and a hash of `msg`.
    pub async fn send_code(&mut self, code: i64, msg: impl Into<String>) {
        let msg = msg.into();
        let translated = self
            .hub
            .i18n
            .translate(&self.language, &self.default_language, &self.action, code, &msg)
            .await;
        self.send_envelope(Envelope::new(&self.action).with_code(code).with_msg(translated));
    }

    fn send_envelope(&mut self, envelope: Envelope) {
        self.client.send_action_msg(&envelope);
        self.response = Some(envelope);
    }

    pub fn send_action_data(&self, action: impl Into<String>, data: serde_json::Value) {
        self.client.send_action_msg(&Envelope::new(action).with_data(data));
    }

    pub fn send_action_msg(&self, action: impl Into<String>, msg: impl Into<String>) {
        self.client.send_action_msg(&Envelope::new(action).with_msg(msg));
    }

    pub async fn send_to(&self, suid: &str, action: impl Into<String>, data: serde_json::Value) {
        if let Some(user) = self.hub.user(suid).await {
            let envelope = Envelope::new(action).with_data(data);
            user.send_msg(envelope.encode()).await;
        }
    }

    pub async fn send_to_app(&self, suid: &str, app_id: &str, action: impl Into<String>, data: serde_json::Value) {
        if let Some(user) = self.hub.user(suid).await {
            let envelope = Envelope::new(action).with_data(data);
            user.send_msg_to_app(app_id, envelope.encode()).await;
        }
    }

    pub async fn send_to_apps(&self, suid: &str, app_ids: &[String], action: impl Into<String> + Clone, data: serde_json::Value) {
        for app_id in app_ids {
            self.send_to_app(suid, app_id, action.clone(), data.clone()).await;
        }
    }

    pub async fn send_raw_to(&self, suid: &str, bytes: Vec<u8>) {
        if let Some(user) = self.hub.user(suid).await {
            user.send_msg(bytes).await;
        }
    }

    pub async fn broadcast(&self, action: impl Into<String>, data: serde_json::Value) {
        let envelope = Envelope::new(action).with_data(data);
        self.hub.broadcast(envelope.encode()).await;
    }

    // ---- params ---------------------------------------------------------

    fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub fn get(&self, key: &str) -> String {
        self.field(key).and_then(|v| v.as_str()).map(str::to_owned).unwrap_or_default()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.field(key).and_then(serde_json::Value::as_i64).unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.field(key).and_then(serde_json::Value::as_bool).unwrap_or_default()
    }

    pub fn get_json(&self, key: &str) -> serde_json::Value {
        self.field(key).cloned().unwrap_or(serde_json::Value::Null)
    }

    /// Returns `0` for missing, non-numeric, or non-positive values —
    /// matching the original's "an id is never negative or zero" contract.
    pub fn get_id(&self, key: &str) -> u64 {
        match self.get_int(key) {
            v if v > 0 => v as u64,
            _ => 0,
        }
    }

    pub fn get_min_int(&self, key: &str, min: i64) -> i64 {
        self.get_int(key).max(min)
    }

    pub fn get_range_int(&self, key: &str, min: i64, max: i64) -> i64 {
        self.get_int(key).clamp(min, max)
    }

    /// Returns the field's string value only if it is one of `allowed`;
    /// otherwise `None`, matching the original's enum-validated getter.
    pub fn get_slice_val(&self, key: &str, allowed: &[&str]) -> Option<String> {
        let value = self.get(key);
        allowed.contains(&value.as_str()).then_some(value)
    }

    pub fn get_pagination(&self, current_key: &str, page_size_key: &str) -> Pagination {
        let page = crate::pagination::Page {
            current: self.get_int(current_key),
            page_size: self.get_int(page_size_key),
        };
        Pagination::init(&page, crate::pagination::DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn get_max_pagination(&self, current_key: &str, page_size_key: &str, max_size: i64) -> Pagination {
        let page = crate::pagination::Page {
            current: self.get_int(current_key),
            page_size: self.get_int(page_size_key),
        };
        Pagination::init(&page, max_size)
    }

    // ---- binding ----------------------------------------------------------

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }

    /// Deserializes only the value at a dotted field path (e.g. `"a.b.c"`)
    /// instead of the whole `params` object, mirroring the original's
    /// `gjson`-based partial binding used to avoid paying for a full decode
    /// when only a nested field is needed.
    pub fn bind_json_path<T: DeserializeOwned>(&self, path: &str) -> Result<T, serde_json::Error> {
        let mut cursor = &self.params;
        for segment in path.split('.') {
            cursor = cursor.get(segment).unwrap_or(&serde_json::Value::Null);
        }
        serde_json::from_value(cursor.clone())
    }

    // ---- pub/sub ------------------------------------------------------

    pub async fn publish(&self, topic_id: &str, data: serde_json::Value) {
        self.hub.pubsub.publish(topic_id, data).await;
    }

    pub async fn subscribe(&self, topic_id: &str) {
        if let Some(user) = self.client.user().await {
            self.hub.pubsub.subscribe(topic_id, &user).await;
        }
    }

    pub async fn subscribe_func(&self, topic_id: &str, f: TopicHandler) {
        self.hub.pubsub.subscribe_func(topic_id, f).await;
    }

    pub async fn unsubscribe(&self, topic_id: &str) {
        if let Some(user) = self.client.user().await {
            self.hub.pubsub.unsubscribe(topic_id, &user).await;
        }
    }

    // ---- logs -----------------------------------------------------------

    pub fn add_log(&mut self, msg: impl Into<String>) {
        self.logs.push(msg.into());
    }

    /// Emits one structured log line summarising the whole request,
    /// matching the original's single end-of-request zap entry rather than
    /// one line per `add_log` call.
    pub fn flush_log(&self) {
        tracing::info!(
            action = %self.action,
            client_id = %self.client.client_id,
            ip = %self.client.ip_address,
            connected_at = %self.connection_time,
            requested_at = %self.request_at,
            logs = ?self.logs,
            "request handled"
        );
    }
}
