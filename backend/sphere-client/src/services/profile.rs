use chrono::Utc;
use document_store::{Backend, BlobCategory, BlobPath, Direction, DocumentData, Query};
use serde_json::json;
use tracing::info;

use crate::domain::models::{Post, POSTS, USERS};
use crate::error::ClientResult;
use crate::services::feed::decode_post;
use crate::services::live::LiveView;
use crate::services::posts::ImageUpload;

/// Profile editing. Denormalized copies of the name and photo in existing
/// posts, comments and conversations are left as they are.
#[derive(Clone)]
pub struct ProfileService {
    backend: Backend,
}

impl ProfileService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn save(&self, uid: &str, display_name: &str, bio: &str) -> ClientResult<()> {
        self.backend
            .documents
            .update(
                USERS,
                uid,
                DocumentData::new()
                    .field("displayName", json!(display_name))
                    .field("bio", json!(bio)),
            )
            .await?;
        info!(uid = %uid, "profile saved");
        Ok(())
    }

    /// Upload a new avatar and point `photoURL` at it; returns the URL
    pub async fn upload_avatar(&self, uid: &str, image: ImageUpload) -> ClientResult<String> {
        let path = BlobPath::new(
            BlobCategory::ProfileImages,
            uid,
            Utc::now().timestamp_millis(),
            &image.file_name,
        );
        self.backend
            .blobs
            .upload(&path, image.bytes, &image.content_type)
            .await?;
        let url = self.backend.blobs.download_url(&path).await?;

        self.backend
            .documents
            .update(USERS, uid, DocumentData::new().field("photoURL", json!(url)))
            .await?;
        info!(uid = %uid, key = %path, "avatar updated");
        Ok(url)
    }

    /// Live list of the user's own posts, newest first
    pub async fn own_posts(&self, uid: &str) -> ClientResult<LiveView<Post>> {
        let live = self
            .backend
            .documents
            .subscribe(
                Query::collection(POSTS)
                    .where_eq("authorId", uid)
                    .order_by("createdAt", Direction::Descending),
            )
            .await?;
        Ok(LiveView::spawn("own-posts", live, decode_post))
    }
}
