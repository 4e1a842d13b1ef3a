use document_store::{Direction, Document, DocumentStore, Query, Result as StoreResult};
use std::sync::Arc;
use tracing::info;

use crate::domain::models::{Post, POSTS};
use crate::error::ClientResult;
use crate::services::live::LiveView;

pub(crate) fn decode_post(doc: &Document) -> StoreResult<Post> {
    doc.decode()
}

/// Live feed of the newest posts
#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn DocumentStore>,
    limit: usize,
}

impl FeedService {
    pub fn new(store: Arc<dyn DocumentStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn query(&self) -> Query {
        Query::collection(POSTS)
            .order_by("createdAt", Direction::Descending)
            .limit(self.limit)
    }

    /// Subscribe; every snapshot replaces the list wholesale
    pub async fn start(&self) -> ClientResult<LiveView<Post>> {
        let live = self.store.subscribe(self.query()).await?;
        info!(limit = self.limit, "feed subscribed");
        Ok(LiveView::spawn("feed", live, decode_post))
    }
}
