/// In-process document store with live queries
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::{Document, DocumentData, Fields};
use crate::error::StoreError;
use crate::live::{LiveQuery, SubscriptionRegistry};
use crate::query::Query;
use crate::{DocumentStore, Result};

type Collection = BTreeMap<String, Document>;

/// Document store kept in memory.
///
/// Every write publishes fresh snapshots to the live queries of the written
/// collection while the data lock is held, so subscribers observe writes in
/// order. Server timestamps are strictly increasing within one store.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    registry: SubscriptionRegistry,
    clock: AtomicI64,
    // collection -> error message returned by every write
    write_failures: Mutex<HashMap<String, String>>,
    // writers hold a read guard; `hold_writes` takes the write side
    write_gate: Arc<RwLock<()>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            registry: SubscriptionRegistry::new(),
            clock: AtomicI64::new(0),
            write_failures: Mutex::new(HashMap::new()),
            write_gate: Arc::new(RwLock::new(())),
        }
    }

    /// Next server timestamp in epoch millis, never equal to a previous one
    fn server_time(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    fn check_write(&self, collection: &str) -> Result<()> {
        validate_path(collection)?;
        let failures = self
            .write_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match failures.get(collection) {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn publish(&self, collection: &str, docs: Option<&Collection>) {
        let docs: Vec<&Document> = docs.map(|c| c.values().collect()).unwrap_or_default();
        self.registry.publish(collection, &docs);
    }

    /// Make every write to `collection` fail with `message`
    pub fn fail_writes(&self, collection: &str, message: &str) {
        self.write_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(collection.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        self.write_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Terminate the live queries on `collection` with an error
    pub fn break_subscriptions(&self, collection: &str, message: &str) {
        self.registry.fail_collection(collection, message);
    }

    /// Hold snapshot delivery; writes still apply
    pub fn pause_delivery(&self) {
        self.registry.set_paused(true);
    }

    /// Resume delivery and push the current state of every subscribed collection
    pub async fn resume_delivery(&self) {
        let collections = self.collections.read().await;
        self.registry.set_paused(false);
        for name in self.registry.collections() {
            self.publish(&name, collections.get(&name));
        }
    }

    /// Suspend writes until the returned guard is dropped
    pub async fn hold_writes(&self) -> OwnedRwLockWriteGuard<()> {
        self.write_gate.clone().write_owned().await
    }

    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.registry.subscriber_count(collection)
    }

    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        data: DocumentData,
        merge_into_existing: bool,
    ) -> Result<()> {
        self.check_write(collection)?;
        validate_path(id)?;

        let _gate = self.write_gate.read().await;
        let mut collections = self.collections.write().await;
        let server_time = self.server_time();
        let now = Utc::now();
        let docs = collections.entry(collection.to_string()).or_default();

        match docs.get_mut(id) {
            Some(existing) if merge_into_existing => {
                data.apply(&mut existing.fields, server_time);
                existing.update_time = now;
            }
            Some(existing) => {
                let mut fields = Fields::new();
                data.apply(&mut fields, server_time);
                existing.fields = fields;
                existing.update_time = now;
            }
            None if merge_into_existing => {
                return Err(StoreError::not_found(collection, id));
            }
            None => {
                let mut fields = Fields::new();
                data.apply(&mut fields, server_time);
                docs.insert(
                    id.to_string(),
                    Document {
                        id: id.to_string(),
                        collection: collection.to_string(),
                        fields,
                        create_time: now,
                        update_time: now,
                    },
                );
            }
        }

        self.publish(collection, collections.get(collection));
        Ok(())
    }
}

fn validate_path(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StoreError::InvalidArgument(format!(
            "invalid path segment '{}'",
            segment
        )));
    }
    Ok(())
}

/// Generated document id: 20 lowercase hex characters
fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(20);
    id
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn add(&self, collection: &str, data: DocumentData) -> Result<String> {
        let id = generate_id();
        self.write_document(collection, &id, data, false).await?;
        debug!(collection = %collection, id = %id, "document added");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.write_document(collection, id, data, false).await?;
        debug!(collection = %collection, id = %id, "document set");
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.write_document(collection, id, data, true).await?;
        debug!(collection = %collection, id = %id, "document updated");
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        validate_path(collection)?;
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_write(collection)?;
        let _gate = self.write_gate.read().await;
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            info!(collection = %collection, id = %id, "document deleted");
            self.publish(collection, collections.get(collection));
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        validate_path(query.collection_name())?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(query.collection_name())
            .map(|c| query.execute(c.values()))
            .unwrap_or_default())
    }

    async fn subscribe(&self, query: Query) -> Result<LiveQuery> {
        validate_path(query.collection_name())?;
        let collection = query.collection_name().to_string();

        // Read lock keeps writers out until the initial snapshot is queued
        let collections = self.collections.read().await;
        let docs: Vec<&Document> = collections
            .get(&collection)
            .map(|c| c.values().collect())
            .unwrap_or_default();
        let (id, receiver) = self.registry.add_subscriber(query, docs);
        drop(collections);

        let registry = self.registry.clone();
        Ok(LiveQuery::new(id, receiver, move || {
            registry.remove_subscriber(&collection, id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update("posts", "missing", DocumentData::new().field("a", json!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::not_found("posts", "missing"));
    }

    #[tokio::test]
    async fn test_set_replaces_and_update_merges() {
        let store = InMemoryStore::new();
        store
            .set(
                "users",
                "u1",
                DocumentData::new()
                    .field("displayName", json!("Ada"))
                    .field("bio", json!("math")),
            )
            .await
            .unwrap();
        store
            .update("users", "u1", DocumentData::new().field("bio", json!("engines")))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.get("displayName"), Some(&json!("Ada")));
        assert_eq!(doc.get("bio"), Some(&json!("engines")));

        store
            .set("users", "u1", DocumentData::new().field("bio", json!("reset")))
            .await
            .unwrap();
        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert!(doc.get("displayName").is_none());
    }

    #[tokio::test]
    async fn test_server_timestamps_strictly_increase() {
        let store = InMemoryStore::new();
        let mut last = 0;
        for _ in 0..50 {
            let id = store
                .add("posts", DocumentData::new().server_timestamp("createdAt"))
                .await
                .unwrap();
            let doc = store.get("posts", &id).await.unwrap().unwrap();
            let ts = doc.get("createdAt").and_then(|v| v.as_i64()).unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = InMemoryStore::new();
        store.fail_writes("posts", "Missing or insufficient permissions.");

        let err = store.add("posts", DocumentData::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing or insufficient permissions.");
        assert_eq!(store.document_count("posts").await, 0);

        store.clear_failures();
        assert!(store.add("posts", DocumentData::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_held_writes_wait_for_release() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let hold = store.hold_writes().await;

        let writer = {
            let store = store.clone();
            tokio::spawn(async move { store.add("posts", DocumentData::new()).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(store.document_count("posts").await, 0);

        drop(hold);
        writer.await.unwrap().unwrap();
        assert_eq!(store.document_count("posts").await, 1);
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        let store = InMemoryStore::new();
        let err = store.add("a/b", DocumentData::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
