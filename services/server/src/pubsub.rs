use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};

use ws_protocol::Envelope;

use crate::hub::Hub;
use crate::user::User;

pub type TopicHandler = Arc<dyn Fn(&TopicMsg) + Send + Sync>;

/// A message dequeued from the fan-out queue: the original payload plus
/// its already-encoded envelope bytes (encoded exactly once per publish).
#[derive(Clone)]
pub struct TopicMsg {
    pub topic_id: String,
    pub original: serde_json::Value,
    pub encoded: Vec<u8>,
}

/// A named in-memory channel. Never destroyed once created (small bounded
/// cost, matches spec.md's lifecycle note); its two subscriber sets —
/// users (by suid) and in-process function callbacks — are independent
/// indexes kept in sync by `PubSub`'s API, per §9's bidirectional-index
/// design note.
pub struct Topic {
    pub id: String,
    sub_users: DashMap<String, DateTime<Utc>>,
    sub_handlers: RwLock<Vec<TopicHandler>>,
}

impl Topic {
    fn new(id: String) -> Self {
        Self {
            id,
            sub_users: DashMap::new(),
            sub_handlers: RwLock::new(Vec::new()),
        }
    }

    fn add_sub_user(&self, suid: &str) {
        self.sub_users.entry(suid.to_owned()).or_insert_with(Utc::now);
    }

    fn remove_sub_user(&self, suid: &str) {
        self.sub_users.remove(suid);
    }

    async fn add_sub_handle(&self, f: TopicHandler) {
        self.sub_handlers.write().await.push(f);
    }

    async fn apply_func(&self, msg: &TopicMsg) {
        for handler in self.sub_handlers.read().await.iter() {
            handler(msg);
        }
    }

    fn subscriber_suids(&self) -> Vec<String> {
        self.sub_users.iter().map(|e| e.key().clone()).collect()
    }
}

/// Topic registry plus the single bounded fan-out queue. `Pub`/`Sub`/
/// `SubFunc` all lazily materialise their topic via `DashMap::entry`,
/// which is a true atomic get-or-create — an improvement over the
/// original's load-then-store (racy under concurrent first-subscribers)
/// while keeping the same "lazy creation is idempotent" contract.
pub struct PubSub {
    topics: DashMap<String, Arc<Topic>>,
    queue_tx: mpsc::Sender<TopicMsg>,
    queue_rx: tokio::sync::Mutex<Option<mpsc::Receiver<TopicMsg>>>,
}

impl PubSub {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        Arc::new(Self {
            topics: DashMap::new(),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(Some(queue_rx)),
        })
    }

    fn init_topic(&self, topic_id: &str) -> Arc<Topic> {
        self.topics
            .entry(topic_id.to_owned())
            .or_insert_with(|| Arc::new(Topic::new(topic_id.to_owned())))
            .clone()
    }

    /// Publishers block when the queue is full (spec.md §4.6/§9: keep the
    /// source's blocking backpressure rather than dropping).
    pub async fn publish(&self, topic_id: &str, data: serde_json::Value) {
        self.init_topic(topic_id);

        let envelope = Envelope::new(topic_id).with_data(serde_json::json!({
            "topicId": topic_id,
            "message": data,
        }));

        let msg = TopicMsg {
            topic_id: topic_id.to_owned(),
            original: data,
            encoded: envelope.encode(),
        };

        let _ = self.queue_tx.send(msg).await;
    }

    pub async fn subscribe(&self, topic_id: &str, user: &Arc<User>) {
        self.init_topic(topic_id).add_sub_user(&user.suid);
        user.add_sub_topic(topic_id).await;
    }

    pub async fn subscribe_func(&self, topic_id: &str, f: TopicHandler) {
        self.init_topic(topic_id).add_sub_handle(f).await;
    }

    pub async fn unsubscribe(&self, topic_id: &str, user: &Arc<User>) {
        if let Some(topic) = self.topics.get(topic_id) {
            topic.remove_sub_user(&user.suid);
            user.unsub_topic(topic_id).await;
        }
    }

    /// Used by `User::unsub_all_topics`, which already owns (and drains)
    /// the user-side index; this only needs to clear the topic side.
    pub async fn remove_sub_user(&self, topic_id: &str, suid: &str) {
        if let Some(topic) = self.topics.get(topic_id) {
            topic.remove_sub_user(suid);
        }
    }

    /// Single consumer draining the fan-out queue: for each message,
    /// function subscribers run first, then user subscribers, matching
    /// the ordering confirmed in the original's `Start()` loop. Missing
    /// topics or missing users (logged out between publish and fan-out)
    /// are silently skipped.
    pub async fn run(pubsub: Arc<PubSub>, hub: Arc<Hub>) {
        let mut queue_rx = pubsub
            .queue_rx
            .lock()
            .await
            .take()
            .expect("PubSub::run must only be called once");

        while let Some(msg) = queue_rx.recv().await {
            let Some(topic) = pubsub.topics.get(&msg.topic_id).map(|e| e.value().clone()) else {
                continue;
            };

            topic.apply_func(&msg).await;

            for suid in topic.subscriber_suids() {
                if let Some(user) = hub.user(&suid).await {
                    user.send_msg(msg.encoded.clone()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_then_publish_records_envelope() {
        let pubsub = PubSub::new(8);
        pubsub.init_topic("room.1");
        assert!(pubsub.topics.contains_key("room.1"));
    }

    #[tokio::test]
    async fn sub_func_is_invoked_on_publish() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pubsub = PubSub::new(8);
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        pubsub
            .subscribe_func(
                "room.1",
                Arc::new(move |_msg: &TopicMsg| {
                    counter_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        pubsub.publish("room.1", serde_json::json!("hello")).await;

        let topic = pubsub.topics.get("room.1").unwrap().clone();
        let msg = {
            let mut rx = pubsub.queue_rx.lock().await;
            rx.as_mut().unwrap().recv().await.unwrap()
        };
        topic.apply_func(&msg).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
