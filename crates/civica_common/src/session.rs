//! Per-user conversation sessions with idle eviction.
//!
//! The store maps a phone-like user identity to an ordered transcript and a
//! last-activity timestamp. Access for different users is safe under
//! concurrency; two simultaneous turns for the same user are not serialized
//! here (the caller awaits one turn before sending the next).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::chat_protocol::ChatMessage;

/// One user's transcript plus bookkeeping
#[derive(Debug, Clone)]
struct ConversationSession {
    messages: Vec<ChatMessage>,
    last_activity: DateTime<Utc>,
}

/// Concurrency-safe keyed session store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, ConversationSession>>>,
    /// System-role instruction text seeded into every new transcript
    seed_prompt: Arc<str>,
}

impl SessionStore {
    pub fn new(seed_prompt: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            seed_prompt: seed_prompt.into().into(),
        }
    }

    /// Snapshot a user's transcript, creating and seeding the session if it
    /// does not exist. Refreshes `last_activity` on every access. The bool
    /// is true when the session was created by this call.
    pub async fn get_or_create(&self, user_id: &str) -> (Vec<ChatMessage>, bool) {
        let mut map = self.inner.write().await;
        let created = !map.contains_key(user_id);
        let session = map.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user = user_id, "Creating conversation session");
            ConversationSession {
                messages: vec![ChatMessage::system(self.seed_prompt.as_ref())],
                last_activity: Utc::now(),
            }
        });
        session.last_activity = Utc::now();
        (session.messages.clone(), created)
    }

    /// Append one message to a user's transcript. Creates the session first
    /// if an eviction raced the turn that is appending.
    pub async fn append(&self, user_id: &str, message: ChatMessage) {
        let mut map = self.inner.write().await;
        let session = map
            .entry(user_id.to_string())
            .or_insert_with(|| ConversationSession {
                messages: vec![ChatMessage::system(self.seed_prompt.as_ref())],
                last_activity: Utc::now(),
            });
        session.messages.push(message);
        session.last_activity = Utc::now();
    }

    /// Drop a user's session. Returns whether one existed.
    pub async fn clear(&self, user_id: &str) -> bool {
        self.inner.write().await.remove(user_id).is_some()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Evict sessions whose last activity predates `idle` at sweep time.
    /// Returns the number evicted. Concurrent refreshes are tolerated: a
    /// session touched after the cutoff is computed simply survives.
    pub async fn sweep_idle(&self, idle: Duration) -> usize {
        let cutoff = Utc::now() - idle;
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, s| s.last_activity >= cutoff);
        before - map.len()
    }

    /// Run the idle sweep on a fixed period until the task is dropped.
    pub fn spawn_sweeper(
        &self,
        period: std::time::Duration,
        idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so a restart does not
            // sweep before any session has had a chance to go idle.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = store.sweep_idle(idle).await;
                if evicted > 0 {
                    info!(evicted, "Idle session sweep");
                }
            }
        })
    }

    #[cfg(test)]
    async fn backdate(&self, user_id: &str, by: Duration) {
        let mut map = self.inner.write().await;
        if let Some(s) = map.get_mut(user_id) {
            s.last_activity = s.last_activity - by;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_protocol::ChatRole;

    #[tokio::test]
    async fn new_session_is_seeded_with_system_prompt() {
        let store = SessionStore::new("You are a civic assistant.");
        let (messages, created) = store.get_or_create("+2348012345678").await;
        assert!(created);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(
            messages[0].content.as_deref(),
            Some("You are a civic assistant.")
        );

        let (_, created_again) = store.get_or_create("+2348012345678").await;
        assert!(!created_again);
        assert_eq!(store.active_count().await, 1);
    }

    #[tokio::test]
    async fn append_extends_transcript_in_order() {
        let store = SessionStore::new("seed");
        store.get_or_create("u").await;
        store.append("u", ChatMessage::user("first")).await;
        store.append("u", ChatMessage::assistant("second")).await;
        let (messages, _) = store.get_or_create("u").await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content.as_deref(), Some("first"));
        assert_eq!(messages[2].content.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn clear_reports_whether_a_session_existed() {
        let store = SessionStore::new("seed");
        store.get_or_create("u").await;
        assert!(store.clear("u").await);
        assert!(!store.clear("u").await);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_sessions() {
        let store = SessionStore::new("seed");
        store.get_or_create("idle").await;
        store.get_or_create("fresh").await;
        store.backdate("idle", Duration::hours(2)).await;

        let evicted = store.sweep_idle(Duration::hours(1)).await;
        assert_eq!(evicted, 1);
        assert_eq!(store.active_count().await, 1);

        // The surviving session was the one accessed within the threshold
        let (_, created) = store.get_or_create("fresh").await;
        assert!(!created);
    }

    #[tokio::test]
    async fn access_refreshes_last_activity() {
        let store = SessionStore::new("seed");
        store.get_or_create("u").await;
        store.backdate("u", Duration::hours(2)).await;
        // Access after backdating brings the session back inside the window
        store.get_or_create("u").await;
        assert_eq!(store.sweep_idle(Duration::hours(1)).await, 0);
    }
}
