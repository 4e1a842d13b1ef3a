/// Post mutations: create, like toggle, comment append
use chrono::Utc;
use document_store::{Backend, BlobCategory, BlobPath, DocumentData};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::models::{Comment, Post, POSTS};
use crate::error::{ClientError, ClientResult};
use crate::services::session::Actor;

/// Image selected for upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Content of the create-post form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub content: String,
    pub image: Option<ImageUpload>,
}

impl PostDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.image = Some(image);
        self
    }

    /// A post needs trimmed content or an image
    pub fn validate(&self) -> ClientResult<()> {
        if self.content.trim().is_empty() && self.image.is_none() {
            return Err(ClientError::InvalidInput(
                "Write something or attach an image to post.".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

/// The write a like toggle issues, decided from the post as last seen
pub fn like_toggle(post: &Post, uid: &str) -> (LikeAction, DocumentData) {
    if post.is_liked_by(uid) {
        (
            LikeAction::Unlike,
            DocumentData::new().array_remove("likes", vec![json!(uid)]),
        )
    } else {
        (
            LikeAction::Like,
            DocumentData::new().array_union("likes", vec![json!(uid)]),
        )
    }
}

#[derive(Clone)]
pub struct PostService {
    backend: Backend,
}

impl PostService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Upload the image (if any), then write the post document.
    ///
    /// The two steps are independent: if the document write fails the
    /// uploaded blob stays in storage.
    pub async fn create_post(&self, actor: &Actor, draft: PostDraft) -> ClientResult<String> {
        draft.validate()?;

        let image_url = match &draft.image {
            Some(image) => {
                let path = BlobPath::new(
                    BlobCategory::PostImages,
                    &actor.uid,
                    Utc::now().timestamp_millis(),
                    &image.file_name,
                );
                self.backend
                    .blobs
                    .upload(&path, image.bytes.clone(), &image.content_type)
                    .await?;
                let url = self.backend.blobs.download_url(&path).await?;
                debug!(key = %path, "post image uploaded");
                Some(url)
            }
            None => None,
        };

        let data = DocumentData::new()
            .field("content", json!(draft.content.trim()))
            .field("imageURL", image_url.map(Value::String).unwrap_or(Value::Null))
            .field("authorId", json!(actor.uid))
            .field("authorName", json!(actor.display_name))
            .field(
                "authorPhoto",
                actor.photo_url.clone().map(Value::String).unwrap_or(Value::Null),
            )
            .server_timestamp("createdAt")
            .field("likes", json!([]))
            .field("comments", json!([]));

        let id = match self.backend.documents.add(POSTS, data).await {
            Ok(id) => id,
            Err(e) => {
                if draft.image.is_some() {
                    warn!(uid = %actor.uid, "post write failed after image upload; blob left in storage");
                }
                return Err(e.into());
            }
        };
        info!(post_id = %id, author_id = %actor.uid, "post created");
        Ok(id)
    }

    /// Add or remove the user from `likes`; no transaction
    pub async fn toggle_like(&self, uid: &str, post: &Post) -> ClientResult<LikeAction> {
        let (action, data) = like_toggle(post, uid);
        self.backend.documents.update(POSTS, &post.id, data).await?;
        debug!(post_id = %post.id, uid = %uid, ?action, "like toggled");
        Ok(action)
    }

    /// Append a comment built on this client; no compare-and-swap
    pub async fn add_comment(&self, actor: &Actor, post_id: &str, text: &str) -> ClientResult<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::InvalidInput("Comment cannot be empty.".to_string()));
        }

        let now = Utc::now();
        let comment = Comment {
            id: now.timestamp_millis().to_string(),
            text: text.to_string(),
            author_id: actor.uid.clone(),
            author_name: actor.display_name.clone(),
            author_photo: actor.photo_or_empty(),
            created_at: now,
        };

        self.backend
            .documents
            .update(
                POSTS,
                post_id,
                DocumentData::new().array_union("comments", vec![serde_json::to_value(&comment)?]),
            )
            .await?;
        debug!(post_id = %post_id, comment_id = %comment.id, "comment added");
        Ok(comment)
    }
}
