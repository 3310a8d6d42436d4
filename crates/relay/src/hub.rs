//! Per-user fan-out to viewer subscribers.
//!
//! Each subscriber holds the receiving half of a bounded queue. Writes go
//! through `try_send` only: a full or closed queue removes the subscriber
//! on the spot, so one slow viewer never stalls the user's worker or its
//! peers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use polyglass_conversation::{ConversationEntry, LanguagePair};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound buffer per subscriber; overflow drops the subscriber.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Typed events pushed to viewers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Connected,
    Translation(ConversationEntry),
    LanguageChange(LanguagePair),
    Clear,
}

impl ViewerEvent {
    /// SSE event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ViewerEvent::Connected => "connected",
            ViewerEvent::Translation(_) => "translation",
            ViewerEvent::LanguageChange(_) => "languageChange",
            ViewerEvent::Clear => "clear",
        }
    }

    /// JSON payload serialized into the SSE `data:` line.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            ViewerEvent::Connected | ViewerEvent::Clear => serde_json::json!({}),
            ViewerEvent::Translation(entry) => {
                serde_json::to_value(entry).unwrap_or(serde_json::Value::Null)
            }
            ViewerEvent::LanguageChange(pair) => {
                serde_json::to_value(pair).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

/// What a new subscriber receives: the `connected` event plus a replay of
/// the conversation log as it stood at subscription, then the live queue.
pub struct Subscription {
    pub id: u64,
    pub initial: Vec<ViewerEvent>,
    pub receiver: mpsc::Receiver<ViewerEvent>,
}

/// Owns one user's subscriber set. Outlives individual sessions so viewers
/// stay connected across session stop and re-open.
#[derive(Default)]
pub struct FanoutHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<ViewerEvent>>>,
    next_id: AtomicU64,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. `replay` must be the log snapshot taken in the
    /// same serialized step, so the initial batch plus the live queue form
    /// one gapless, duplicate-free sequence.
    pub fn subscribe(&self, replay: Vec<ConversationEntry>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut initial = Vec::with_capacity(replay.len() + 1);
        initial.push(ViewerEvent::Connected);
        initial.extend(replay.into_iter().map(ViewerEvent::Translation));

        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(id, tx);
        }
        tracing::debug!(subscriber = id, "subscriber_added");

        Subscription {
            id,
            initial,
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            if subscribers.remove(&id).is_some() {
                tracing::debug!(subscriber = id, "subscriber_removed");
            }
        }
    }

    /// Deliver one event to every live subscriber, pruning the dead.
    pub fn broadcast(&self, event: &ViewerEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = *id, "subscriber_dropped_backpressure");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = *id, "subscriber_dropped_disconnected");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, text: &str) -> ConversationEntry {
        ConversationEntry {
            id: id.to_string(),
            timestamp: 0,
            original_text: text.to_string(),
            translated_text: text.to_string(),
            original_language: "English".to_string(),
            translated_language: "French".to_string(),
            is_final: true,
            is_new_utterance: true,
        }
    }

    #[tokio::test]
    async fn subscriber_gets_connected_then_replay_then_live() {
        let hub = FanoutHub::new();
        let mut sub = hub.subscribe(vec![entry("entry-1", "a"), entry("entry-2", "b")]);

        assert_eq!(sub.initial[0], ViewerEvent::Connected);
        assert_eq!(sub.initial[1], ViewerEvent::Translation(entry("entry-1", "a")));
        assert_eq!(sub.initial[2], ViewerEvent::Translation(entry("entry-2", "b")));

        hub.broadcast(&ViewerEvent::Translation(entry("entry-3", "c")));
        let live = sub.receiver.recv().await.unwrap();
        assert_eq!(live, ViewerEvent::Translation(entry("entry-3", "c")));
    }

    #[tokio::test]
    async fn disconnected_subscriber_is_pruned_on_next_write() {
        let hub = FanoutHub::new();
        let sub = hub.subscribe(vec![]);
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub.receiver);
        hub.broadcast(&ViewerEvent::Clear);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn backpressured_subscriber_is_dropped_without_blocking() {
        let hub = FanoutHub::new();
        let _sub = hub.subscribe(vec![]);

        for _ in 0..=SUBSCRIBER_QUEUE_DEPTH {
            hub.broadcast(&ViewerEvent::Clear);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_affect_peers() {
        let hub = FanoutHub::new();
        let _slow = hub.subscribe(vec![]);
        let mut healthy = hub.subscribe(vec![]);

        for _ in 0..=SUBSCRIBER_QUEUE_DEPTH {
            hub.broadcast(&ViewerEvent::Clear);
            while healthy.receiver.try_recv().is_ok() {}
        }

        hub.broadcast(&ViewerEvent::Connected);
        assert_eq!(healthy.receiver.try_recv().unwrap(), ViewerEvent::Connected);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn event_names_and_payloads() {
        assert_eq!(ViewerEvent::Connected.name(), "connected");
        assert_eq!(ViewerEvent::Clear.payload(), serde_json::json!({}));

        let event = ViewerEvent::Translation(entry("entry-7", "bonjour"));
        assert_eq!(event.name(), "translation");
        assert_eq!(event.payload()["id"], "entry-7");
        assert_eq!(event.payload()["isFinal"], true);

        let change = ViewerEvent::LanguageChange(LanguagePair {
            from: "en-US".to_string(),
            to: "fr-FR".to_string(),
        });
        assert_eq!(change.name(), "languageChange");
        assert_eq!(change.payload()["to"], "fr-FR");
    }
}
