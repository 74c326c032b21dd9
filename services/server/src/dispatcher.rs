use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use ws_protocol::{reserved, Envelope};

use crate::client::Client;
use crate::context::Context;
use crate::error::DispatchError;

/// Entry point for every inbound text frame, invoked by the client's
/// request task. Mirrors the original's `Dispatcher(c, request)` hot path:
/// a ping fast-path that never touches the router or the rate limiter, a
/// ban check ahead of any handler, then chain lookup/invocation with a
/// not-found response for unregistered actions.
pub async fn dispatch(client: &Arc<Client>, raw: &str) {
    let Some(action) = Envelope::peek_action(raw) else {
        client.log("--", DispatchError::MalformedEnvelope(raw.to_owned()));
        return;
    };

    if action == reserved::PING {
        client.touch_heartbeat().await;
        client.send_action_msg(&Envelope::new(reserved::PING).with_msg("pong"));
        return;
    }

    if let Some(user) = client.user().await {
        let (banned, until) = user.is_banned().await;
        if banned {
            client.log("--", DispatchError::Banned(until));
            let envelope = Envelope::new(reserved::SYS_BAN)
                .with_code(reserved::SYS_BAN_CODE)
                .with_data(serde_json::json!({ "banUntil": until }));
            client.send_action_msg(&envelope);
            return;
        }
    }

    *client.last_request_time.write().await = Some(chrono::Utc::now());
    if client.last_heartbeat_time.read().await.is_none() {
        client.touch_heartbeat().await;
    }

    if !client.rate_limiter.allow() {
        client.log("--", DispatchError::RateLimited);
        let envelope = Envelope::new(reserved::SYS_RATE_LIMIT)
            .with_code(reserved::SYS_RATE_LIMIT_CODE)
            .with_msg(reserved::SYS_RATE_LIMIT_MSG);
        client.send_action_msg(&envelope);
        return;
    }

    let hub = client.hub().clone();
    let Some(handlers) = hub.router.resolve(&action).await else {
        client.log("--", DispatchError::ActionNotFound(action.clone()));
        let envelope = Envelope::new(&action)
            .with_code(reserved::NOT_SUPPORTED_CODE)
            .with_msg(reserved::NOT_SUPPORTED_MSG);
        client.send_action_msg(&envelope);
        return;
    };

    let params_raw = Envelope::peek_params(raw);
    let params = serde_json::from_str(&params_raw).unwrap_or(serde_json::Value::Null);
    let language = client.language().await;
    let default_language = hub.config().default_language.clone();

    let mut ctx = Context::new(
        client.clone(),
        hub,
        action.clone(),
        params,
        language,
        default_language,
        handlers,
    );

    // Isolates a panicking handler to this one request: the request task
    // keeps running and the connection stays open for the next message.
    if let Err(panic) = AssertUnwindSafe(ctx.next()).catch_unwind().await {
        let message = panic_message(&panic);
        client.log("--", DispatchError::HandlerPanic(message));
        let envelope = Envelope::new(&action)
            .with_code(reserved::NOT_SUPPORTED_CODE)
            .with_msg("internal error");
        client.send_action_msg(&envelope);
    }

    ctx.flush_log();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::hub::Hub;
    use crate::router::HandlerFunc;

    #[tokio::test]
    async fn ping_short_circuits_before_the_router() {
        let hub = Hub::new(HubConfig::default());
        let (client, mut send_rx, _request_rx) = Client::new_for_test(hub.clone());

        dispatch(&client, r#"{"action":"ping"}"#).await;

        let sent = send_rx.try_recv().expect("ping should reply immediately");
        let envelope: Envelope = serde_json::from_slice(&sent).unwrap();
        assert_eq!(envelope.action, "ping");
        assert_eq!(envelope.msg, "pong");
        assert!(client.last_heartbeat_time.read().await.is_some());
    }

    #[tokio::test]
    async fn logged_in_client_is_rejected_once_its_own_user_is_banned() {
        let hub = Hub::new(HubConfig::default());
        let handler: HandlerFunc = Arc::new(|ctx: &mut Context| Box::pin(async move {
            ctx.send_ok();
        }));
        hub.router.add("chat.send", vec![handler]).await;

        let (client, mut send_rx, _request_rx) = Client::new_for_test(hub.clone());
        let user = Arc::new(crate::user::User::new("u1".to_owned(), hub.pubsub.clone()));
        user.app_login("web", client.clone()).await;

        assert!(client.user().await.is_some(), "app_login must set the client's user back-reference");

        user.ban(chrono::Duration::seconds(60)).await;
        dispatch(&client, r#"{"action":"chat.send"}"#).await;

        let sent = send_rx.try_recv().unwrap();
        let envelope: Envelope = serde_json::from_slice(&sent).unwrap();
        assert_eq!(envelope.action, reserved::SYS_BAN);
    }

    #[tokio::test]
    async fn unregistered_action_gets_not_found_response() {
        let hub = Hub::new(HubConfig::default());
        let (client, mut send_rx, _request_rx) = Client::new_for_test(hub.clone());

        dispatch(&client, r#"{"action":"no.such.action"}"#).await;

        let sent = send_rx.try_recv().unwrap();
        let envelope: Envelope = serde_json::from_slice(&sent).unwrap();
        assert_eq!(envelope.code, reserved::NOT_SUPPORTED_CODE);
    }

    #[tokio::test]
    async fn handler_panic_is_isolated_and_reported() {
        let hub = Hub::new(HubConfig::default());
        let handler: HandlerFunc = Arc::new(|_ctx: &mut Context| Box::pin(async move {
            panic!("boom");
        }));
        hub.router.add("chaos.panic", vec![handler]).await;

        let (client, mut send_rx, _request_rx) = Client::new_for_test(hub.clone());
        dispatch(&client, r#"{"action":"chaos.panic"}"#).await;

        let sent = send_rx.try_recv().unwrap();
        let envelope: Envelope = serde_json::from_slice(&sent).unwrap();
        assert_eq!(envelope.msg, "internal error");
    }

    #[tokio::test]
    async fn banned_user_is_rejected_before_handler_runs() {
        let hub = Hub::new(HubConfig::default());
        let handler: HandlerFunc = Arc::new(|ctx: &mut Context| Box::pin(async move {
            ctx.send_ok();
        }));
        hub.router.add("chat.send", vec![handler]).await;

        let (client, mut send_rx, _request_rx) = Client::new_for_test(hub.clone());
        let user = Arc::new(crate::user::User::new("u1".to_owned(), hub.pubsub.clone()));
        user.ban(chrono::Duration::seconds(60)).await;
        client.set_user(Some(user)).await;

        dispatch(&client, r#"{"action":"chat.send"}"#).await;

        let sent = send_rx.try_recv().unwrap();
        let envelope: Envelope = serde_json::from_slice(&sent).unwrap();
        assert_eq!(envelope.action, reserved::SYS_BAN);
        assert_eq!(envelope.code, reserved::SYS_BAN_CODE);
    }
}
