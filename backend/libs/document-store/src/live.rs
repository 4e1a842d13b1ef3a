/// Live query subscriptions and snapshot fan-out
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::document::Document;
use crate::error::StoreError;
use crate::query::Query;
use crate::Result;

/// Full result set of a query at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub documents: Vec<Document>,
    pub read_time: DateTime<Utc>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.id.as_str()).collect()
    }
}

pub type SnapshotResult = Result<QuerySnapshot>;

/// Unique identifier for a live query subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Client side of a live query.
///
/// Yields the initial snapshot, then a new full snapshot whenever the result
/// set changes. An error ends the stream. Dropping the handle unsubscribes.
pub struct LiveQuery {
    id: SubscriptionId,
    receiver: UnboundedReceiver<SnapshotResult>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl LiveQuery {
    pub fn new(
        id: SubscriptionId,
        receiver: UnboundedReceiver<SnapshotResult>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            detach: Some(Box::new(detach)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next snapshot, or `None` once the backend closed the stream
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self)
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    query: Query,
    sender: UnboundedSender<SnapshotResult>,
    last_delivered: Option<Vec<Document>>,
}

impl Subscriber {
    /// Send the current result set if it differs from the last one delivered.
    /// Returns false when the receiving side is gone.
    fn deliver<'a>(&mut self, docs: impl IntoIterator<Item = &'a Document>) -> bool {
        let documents = self.query.execute(docs);
        if self.last_delivered.as_ref() == Some(&documents) {
            return true;
        }
        let snapshot = QuerySnapshot {
            documents: documents.clone(),
            read_time: Utc::now(),
        };
        if self.sender.send(Ok(snapshot)).is_err() {
            return false;
        }
        self.last_delivered = Some(documents);
        true
    }
}

#[derive(Default)]
struct RegistryState {
    // collection -> subscribers
    subscribers: HashMap<String, Vec<Subscriber>>,
    paused: bool,
}

/// Registry of live query subscribers, keyed by collection.
///
/// Callers hold the store's data lock while publishing so snapshots for one
/// collection are delivered in write order.
#[derive(Default, Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber and deliver its initial snapshot (deferred while paused)
    pub fn add_subscriber<'a>(
        &self,
        query: Query,
        docs: impl IntoIterator<Item = &'a Document>,
    ) -> (SubscriptionId, UnboundedReceiver<SnapshotResult>) {
        let (tx, rx) = unbounded_channel();
        let id = SubscriptionId::new();
        let collection = query.collection_name().to_string();

        let mut subscriber = Subscriber {
            id,
            query,
            sender: tx,
            last_delivered: None,
        };

        let mut state = self.state();
        if !state.paused {
            subscriber.deliver(docs);
        }
        let entry = state.subscribers.entry(collection.clone()).or_default();
        entry.push(subscriber);

        tracing::debug!(
            subscription_id = ?id,
            collection = %collection,
            total = entry.len(),
            "live query subscribed"
        );

        (id, rx)
    }

    pub fn remove_subscriber(&self, collection: &str, id: SubscriptionId) {
        let mut state = self.state();
        if let Some(subscribers) = state.subscribers.get_mut(collection) {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != id);
            if before != subscribers.len() {
                tracing::debug!(
                    subscription_id = ?id,
                    collection = %collection,
                    remaining = subscribers.len(),
                    "live query unsubscribed"
                );
            }
            if subscribers.is_empty() {
                state.subscribers.remove(collection);
            }
        }
    }

    /// Push changed result sets to every subscriber of `collection`.
    ///
    /// Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, collection: &str, docs: &[&Document]) {
        let mut state = self.state();
        if state.paused {
            return;
        }
        if let Some(subscribers) = state.subscribers.get_mut(collection) {
            let before = subscribers.len();
            subscribers.retain_mut(|s| s.deliver(docs.iter().copied()));
            let after = subscribers.len();
            if before != after {
                tracing::debug!(
                    collection = %collection,
                    cleaned = before - after,
                    active = after,
                    "dead live query receivers cleaned up"
                );
            }
        }
    }

    /// Terminate every subscription on `collection` with an error
    pub fn fail_collection(&self, collection: &str, message: &str) {
        let mut state = self.state();
        if let Some(subscribers) = state.subscribers.remove(collection) {
            tracing::warn!(
                collection = %collection,
                count = subscribers.len(),
                "terminating live queries: {}",
                message
            );
            for subscriber in subscribers {
                let _ = subscriber
                    .sender
                    .send(Err(StoreError::Subscription(message.to_string())));
            }
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.state().paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn collections(&self) -> Vec<String> {
        self.state().subscribers.keys().cloned().collect()
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.state()
            .subscribers
            .get(collection)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}
