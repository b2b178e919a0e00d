//! Bounded publish/subscribe broker for generation progress events.
//!
//! The broker keeps a ring of the last K events (FIFO eviction) and fans
//! published events out to every connected subscriber through a bounded
//! queue. Publishing never blocks: a subscriber whose queue is full simply
//! misses that event, and a disconnected subscriber is dropped lazily.
//!
//! The broker is owned by the composition root and passed by handle,
//! never reached through a global.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default capacity of the event ring buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 800;

/// Capacity of each subscriber's outbound queue.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 200;

/// Severity of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// One progress event as it appears on the wire:
/// `{ts, level, message, data?, redirect?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Unix seconds.
    pub ts: i64,
    pub level: EventLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Terminal success signal carrying a location for the caller to
    /// navigate to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl ProgressEvent {
    fn new(level: EventLevel, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            ts: Utc::now().timestamp(),
            level,
            message: message.into(),
            data,
            redirect: None,
        }
    }

    pub fn info(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::new(EventLevel::Info, message, data)
    }

    pub fn warn(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::new(EventLevel::Warn, message, data)
    }

    pub fn error(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::new(EventLevel::Error, message, data)
    }

    pub fn with_redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect = Some(location.into());
        self
    }
}

struct SubscriberSlot {
    id: u64,
    tx: mpsc::Sender<ProgressEvent>,
}

struct Inner {
    buffer: VecDeque<ProgressEvent>,
    subscribers: Vec<SubscriberSlot>,
    next_id: u64,
}

/// Process-wide event hub with bounded memory.
pub struct EventBroker {
    inner: Mutex<Inner>,
    buffer_size: usize,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(buffer_size),
                subscribers: Vec::new(),
                next_id: 0,
            }),
            buffer_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicked publisher must not silence the whole event stream.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event to the ring (evicting the oldest on overflow) and
    /// forward it to every connected subscriber. Never blocks: full
    /// subscriber queues drop the event for that subscriber only, closed
    /// ones are removed.
    pub fn publish(&self, event: ProgressEvent) {
        let mut inner = self.lock();

        if self.buffer_size > 0 {
            while inner.buffer.len() >= self.buffer_size {
                inner.buffer.pop_front();
            }
            inner.buffer.push_back(event.clone());
        }

        inner.subscribers.retain(|slot| {
            match slot.tx.try_send(event.clone()) {
                Ok(()) => true,
                // Slow subscriber: drop this event for them, keep the slot.
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Current ring contents, oldest first.
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.lock().buffer.iter().cloned().collect()
    }

    /// Register a subscriber. The returned handle yields the buffer
    /// snapshot first, then subsequently published events, until the
    /// subscriber is dropped or unsubscribed.
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let backlog: VecDeque<ProgressEvent> = inner.buffer.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        inner.subscribers.push(SubscriberSlot { id, tx });

        Subscription { id, backlog, rx }
    }

    /// Detach a subscriber. Idempotent; safe after the stream already
    /// ended.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().subscribers.retain(|slot| slot.id != id);
    }

    /// Number of currently attached subscribers (closed ones may still be
    /// counted until the next publish prunes them).
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription: snapshot backlog first, then the live stream.
pub struct Subscription {
    id: u64,
    backlog: VecDeque<ProgressEvent>,
    rx: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once detached and drained.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.rx.recv().await
    }

    /// Non-blocking variant used by tests and by drain loops.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> ProgressEvent {
        ProgressEvent::info(message, None)
    }

    #[test]
    fn buffer_never_exceeds_capacity_and_evicts_fifo() {
        let broker = EventBroker::with_buffer_size(3);
        for i in 0..10 {
            broker.publish(event(&format!("e{i}")));
        }
        let snapshot = broker.snapshot();
        assert_eq!(snapshot.len(), 3);
        let messages: Vec<&str> = snapshot.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["e7", "e8", "e9"], "oldest entries evicted first");
    }

    #[tokio::test]
    async fn subscriber_receives_snapshot_then_live() {
        let broker = EventBroker::with_buffer_size(8);
        broker.publish(event("before-1"));
        broker.publish(event("before-2"));

        let mut sub = broker.subscribe();
        broker.publish(event("after"));

        assert_eq!(sub.next().await.unwrap().message, "before-1");
        assert_eq!(sub.next().await.unwrap().message, "before-2");
        assert_eq!(sub.next().await.unwrap().message, "after");
    }

    #[tokio::test]
    async fn events_delivered_in_publish_order() {
        let broker = EventBroker::new();
        let mut sub = broker.subscribe();
        for i in 0..20 {
            broker.publish(event(&format!("e{i}")));
        }
        for i in 0..20 {
            assert_eq!(sub.next().await.unwrap().message, format!("e{i}"));
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let broker = EventBroker::new();
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();
        broker.publish(event("shared"));
        assert_eq!(a.next().await.unwrap().message, "shared");
        assert_eq!(b.next().await.unwrap().message, "shared");
    }

    #[test]
    fn full_subscriber_queue_drops_only_for_that_subscriber() {
        let broker = EventBroker::new();
        let mut slow = broker.subscribe();
        let mut fast = broker.subscribe();

        // Overflow the slow subscriber's queue without draining it.
        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY + 50) {
            broker.publish(event(&format!("e{i}")));
            // Keep the fast subscriber drained so it never overflows.
            while fast.try_next().is_some() {}
        }

        let mut slow_received = 0;
        while slow.try_next().is_some() {
            slow_received += 1;
        }
        assert_eq!(
            slow_received, SUBSCRIBER_QUEUE_CAPACITY,
            "slow subscriber keeps only its queue capacity"
        );

        // Publishing still works and the slow subscriber is still attached.
        assert_eq!(broker.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_next_publish() {
        let broker = EventBroker::new();
        let sub = broker.subscribe();
        assert_eq!(broker.subscriber_count(), 1);

        drop(sub);
        broker.publish(event("after-drop"));
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let broker = EventBroker::new();
        let sub = broker.subscribe();
        let id = sub.id();

        broker.unsubscribe(id);
        broker.unsubscribe(id);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn wire_shape_matches_contract() {
        let e = ProgressEvent::info("hello", Some(serde_json::json!({"attempt": 1})))
            .with_redirect("/api/goals/abc");
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["data"]["attempt"], 1);
        assert_eq!(value["redirect"], "/api/goals/abc");
        assert!(value["ts"].is_i64());
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let e = ProgressEvent::warn("plain", None);
        let value = serde_json::to_value(&e).unwrap();
        assert!(value.get("data").is_none());
        assert!(value.get("redirect").is_none());
    }
}
