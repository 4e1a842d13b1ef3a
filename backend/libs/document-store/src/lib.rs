//! In-process backend-as-a-service: document store, blob storage and auth
//!
//! Provides the three backend surfaces a social client talks to, behind
//! async traits, plus in-memory implementations with live query fan-out.
//!
//! # Architecture
//!
//! ```text
//! client action
//!   1. DocumentStore::add / set / update      (write)
//!      ↓
//! InMemoryStore (data lock held)
//!   2. apply field writes, stamp server time
//!   3. SubscriptionRegistry::publish(collection)
//!      ↓
//! LiveQuery receivers (one mpsc channel per subscriber)
//!   4. full snapshot, only when the result set changed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use document_store::{DocumentData, DocumentStore, InMemoryStore, Query, Direction};
//!
//! #[tokio::main]
//! async fn main() -> document_store::Result<()> {
//!     let store = InMemoryStore::new();
//!     let mut feed = store
//!         .subscribe(Query::collection("posts").order_by("createdAt", Direction::Descending).limit(20))
//!         .await?;
//!
//!     store
//!         .add("posts", DocumentData::new().field("content", serde_json::json!("hi")).server_timestamp("createdAt"))
//!         .await?;
//!
//!     while let Some(snapshot) = feed.next().await {
//!         println!("{} posts", snapshot?.len());
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

pub mod auth;
pub mod blob;
pub mod document;
pub mod error;
pub mod live;
pub mod memory;
pub mod query;

pub use auth::{
    AuthProvider, AuthUser, FederatedCredential, InMemoryAuthProvider, SignInOutcome,
    SignInProvider,
};
pub use blob::{BlobCategory, BlobConfig, BlobMetadata, BlobPath, BlobStore, InMemoryBlobStore};
pub use document::{Document, DocumentData, FieldValue, Fields};
pub use error::StoreError;
pub use live::{LiveQuery, QuerySnapshot, SnapshotResult, SubscriptionId};
pub use memory::InMemoryStore;
pub use query::{Direction, Filter, Query};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Document database with live queries
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document with a generated id and return the id
    async fn add(&self, collection: &str, data: DocumentData) -> Result<String>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, data: DocumentData) -> Result<()>;

    /// Merge writes into an existing document; fails with `NotFound` if missing
    async fn update(&self, collection: &str, id: &str, data: DocumentData) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// One-shot query
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Live query; the first item is the current result set
    async fn subscribe(&self, query: Query) -> Result<LiveQuery>;
}

/// Handle to the three backend surfaces
#[derive(Clone)]
pub struct Backend {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth: Arc<dyn AuthProvider>,
}

/// In-memory backend keeping typed handles so tests can reach the fault hooks
#[derive(Clone)]
pub struct InMemoryBackend {
    pub documents: Arc<InMemoryStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub auth: Arc<InMemoryAuthProvider>,
}

impl InMemoryBackend {
    pub fn new(blob_config: BlobConfig) -> Self {
        Self {
            documents: Arc::new(InMemoryStore::new()),
            blobs: Arc::new(InMemoryBlobStore::new(blob_config)),
            auth: Arc::new(InMemoryAuthProvider::new()),
        }
    }

    /// Type-erased handle
    pub fn backend(&self) -> Backend {
        Backend {
            documents: self.documents.clone(),
            blobs: self.blobs.clone(),
            auth: self.auth.clone(),
        }
    }

    /// Handle for another device on the same data: shared documents and blobs,
    /// separate auth provider (accounts are not shared)
    pub fn other_device(&self) -> Backend {
        Backend {
            documents: self.documents.clone(),
            blobs: self.blobs.clone(),
            auth: Arc::new(InMemoryAuthProvider::new()),
        }
    }
}
