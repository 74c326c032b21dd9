use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::client::Client;
use crate::pubsub::PubSub;

/// A logical identity that may be bound to several `Client`s simultaneously,
/// one per `appId` (e.g. one for "web", one for "ios"). Owns its clients
/// and its topic-subscription index; `Client`'s back-reference to its
/// `User` is a plain `Arc` that gets cleared on logout/close, matching
/// §9's "non-owning back-pointer... cleared in Close" guidance (Rust has
/// no cycle-collector, so clearing it explicitly is what prevents a leak
/// rather than an ownership-typing trick).
pub struct User {
    pub suid: String,
    pub nickname: RwLock<String>,
    pub ban_until: RwLock<Option<DateTime<Utc>>>,
    pub last_heartbeat_time: RwLock<Option<DateTime<Utc>>>,

    app_clients: RwLock<Vec<(String, Arc<Client>)>>,
    sub_topics: RwLock<HashSet<String>>,

    pubsub: Arc<PubSub>,
}

impl User {
    pub fn new(suid: String, pubsub: Arc<PubSub>) -> Self {
        Self {
            suid,
            nickname: RwLock::new(String::new()),
            ban_until: RwLock::new(None),
            last_heartbeat_time: RwLock::new(None),
            app_clients: RwLock::new(Vec::new()),
            sub_topics: RwLock::new(HashSet::new()),
            pubsub,
        }
    }

    /// If another client already holds `app_id` under a *different*
    /// connection, it is displaced: removed from `app_clients` and closed
    /// directly (see DESIGN.md for why this closes synchronously here
    /// instead of round-tripping through the hub's Disconnect channel —
    /// the original's equivalent path has a gap where the displaced
    /// socket is never actually closed).
    pub async fn app_login(self: &Arc<Self>, app_id: &str, new_client: Arc<Client>) {
        {
            let mut clients = self.app_clients.write().await;
            if let Some(pos) = clients.iter().position(|(id, _)| id == app_id) {
                let (_, old_client) = clients.remove(pos);
                if !Arc::ptr_eq(&old_client, &new_client) {
                    old_client.set_user(None).await;
                    old_client.close();
                }
            }
            clients.push((app_id.to_owned(), new_client.clone()));
        }

        new_client.set_user(Some(self.clone())).await;
        new_client.set_login(true);
        new_client.set_app_id(app_id).await;
        self.touch_heartbeat().await;

        self.pubsub
            .publish("login", serde_json::json!({ "suid": self.suid }))
            .await;
    }

    /// Removes the client bound to `app_id` if its connection matches
    /// `client`, then closes it. Always publishes `"logout"`, matching
    /// the original's unconditional publish regardless of match.
    pub async fn app_logout(&self, app_id: &str, client: &Arc<Client>) {
        let removed = {
            let mut clients = self.app_clients.write().await;
            clients
                .iter()
                .position(|(id, c)| id == app_id && Arc::ptr_eq(c, client))
                .map(|pos| clients.remove(pos))
        };

        if let Some((_, removed_client)) = removed {
            removed_client.set_user(None).await;
            removed_client.close();
        }

        self.pubsub
            .publish("logout", serde_json::json!({ "suid": self.suid }))
            .await;
    }

    pub async fn app_client(&self, app_id: &str) -> Option<Arc<Client>> {
        self.app_clients
            .read()
            .await
            .iter()
            .find(|(id, _)| id == app_id)
            .map(|(_, c)| c.clone())
    }

    pub async fn is_banned(&self) -> (bool, Option<DateTime<Utc>>) {
        match *self.ban_until.read().await {
            Some(until) if until > Utc::now() => (true, Some(until)),
            _ => (false, None),
        }
    }

    pub async fn ban(&self, duration: chrono::Duration) {
        *self.ban_until.write().await = Some(Utc::now() + duration);
    }

    pub async fn unban(&self) {
        *self.ban_until.write().await = None;
    }

    pub async fn is_online(&self) -> bool {
        !self.app_clients.read().await.is_empty()
    }

    pub async fn send_msg(&self, bytes: Vec<u8>) {
        for (_, client) in self.app_clients.read().await.iter() {
            client.send_msg(bytes.clone());
        }
    }

    pub async fn send_msg_to_app(&self, app_id: &str, bytes: Vec<u8>) {
        if let Some(client) = self.app_client(app_id).await {
            client.send_msg(bytes);
        }
    }

    pub async fn add_sub_topic(&self, topic_id: &str) -> usize {
        let mut topics = self.sub_topics.write().await;
        topics.insert(topic_id.to_owned());
        topics.len()
    }

    pub async fn unsub_topic(&self, topic_id: &str) -> usize {
        let mut topics = self.sub_topics.write().await;
        topics.remove(topic_id);
        topics.len()
    }

    /// Removes every topic this user is subscribed to, unsubscribing the
    /// user from each topic's own index to keep the bidirectional
    /// topic<->user index in sync (§9 design notes).
    pub async fn unsub_all_topics(&self) -> usize {
        let topics: Vec<String> = self.sub_topics.write().await.drain().collect();
        let count = topics.len();
        for topic_id in topics {
            self.pubsub.remove_sub_user(&topic_id, &self.suid).await;
        }
        count
    }

    pub async fn last_heartbeat_time(&self) -> Option<DateTime<Utc>> {
        *self.last_heartbeat_time.read().await
    }

    pub async fn touch_heartbeat(&self) {
        *self.last_heartbeat_time.write().await = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::PubSub;

    #[tokio::test]
    async fn is_banned_reflects_future_and_past_timestamps() {
        let pubsub = PubSub::new(8);
        let user = User::new("u1".to_owned(), pubsub);

        let (banned, _) = user.is_banned().await;
        assert!(!banned);

        user.ban(chrono::Duration::seconds(60)).await;
        let (banned, until) = user.is_banned().await;
        assert!(banned);
        assert!(until.unwrap() > Utc::now());

        user.unban().await;
        let (banned, _) = user.is_banned().await;
        assert!(!banned);
    }

    #[tokio::test]
    async fn is_online_reflects_app_clients() {
        let pubsub = PubSub::new(8);
        let user = User::new("u1".to_owned(), pubsub);
        assert!(!user.is_online().await);
    }

    #[tokio::test]
    async fn sub_topic_bookkeeping_round_trips() {
        let pubsub = PubSub::new(8);
        let user = User::new("u1".to_owned(), pubsub);

        assert_eq!(user.add_sub_topic("room.1").await, 1);
        assert_eq!(user.unsub_topic("room.1").await, 0);
    }

    #[tokio::test]
    async fn app_login_sets_the_client_back_reference_and_marks_it_online() {
        let hub = crate::hub::Hub::new(crate::config::HubConfig::default());
        let (client, _send_rx, _request_rx) = crate::client::Client::new_for_test(hub.clone());
        let user = Arc::new(User::new("u1".to_owned(), hub.pubsub.clone()));

        user.app_login("web", client.clone()).await;

        assert!(client.user().await.is_some());
        assert!(user.is_online().await);
        assert!(client.is_login().await);
    }
}
