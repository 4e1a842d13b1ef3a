/// Conversations and direct messages
use document_store::{Direction, Document, DocumentData, DocumentStore, Query, Result as StoreResult};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::models::{Conversation, Message, UserProfile, CONVERSATIONS, MESSAGES};
use crate::error::{ClientError, ClientResult};
use crate::services::live::LiveView;
use crate::services::session::Actor;

fn decode_conversation(doc: &Document) -> StoreResult<Conversation> {
    doc.decode()
}

fn decode_message(doc: &Document) -> StoreResult<Message> {
    doc.decode()
}

/// First loaded conversation that already includes `other_uid`
pub fn find_existing<'a>(conversations: &'a [Conversation], other_uid: &str) -> Option<&'a Conversation> {
    conversations.iter().find(|c| c.includes(other_uid))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedConversation {
    pub id: String,
    /// False when an already loaded conversation was reused
    pub created: bool,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn DocumentStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Live list of conversations `uid` participates in
    pub async fn subscribe(&self, uid: &str) -> ClientResult<LiveView<Conversation>> {
        let live = self
            .store
            .subscribe(Query::collection(CONVERSATIONS).where_array_contains("participants", uid))
            .await?;
        Ok(LiveView::spawn("conversations", live, decode_conversation))
    }

    /// Live message list of one conversation, oldest first
    pub async fn messages(&self, conversation_id: &str) -> ClientResult<LiveView<Message>> {
        let live = self
            .store
            .subscribe(
                Query::collection(MESSAGES)
                    .where_eq("conversationId", conversation_id)
                    .order_by("createdAt", Direction::Ascending),
            )
            .await?;
        debug!(conversation_id = %conversation_id, "messages subscribed");
        Ok(LiveView::spawn("messages", live, decode_message))
    }

    /// Reuse a loaded conversation with `other`, or create one.
    ///
    /// Only the conversations already loaded on this client are checked, so
    /// two clients starting at the same time both create a document.
    pub async fn start(
        &self,
        actor: &Actor,
        loaded: &[Conversation],
        other: &UserProfile,
    ) -> ClientResult<StartedConversation> {
        if let Some(existing) = find_existing(loaded, &other.uid) {
            return Ok(StartedConversation {
                id: existing.id.clone(),
                created: false,
            });
        }

        let mut names = Map::new();
        names.insert(actor.uid.clone(), json!(actor.display_name));
        names.insert(other.uid.clone(), json!(other.display_name));
        let mut photos = Map::new();
        photos.insert(actor.uid.clone(), json!(actor.photo_or_empty()));
        photos.insert(
            other.uid.clone(),
            json!(other.photo_url.clone().unwrap_or_default()),
        );

        let id = self
            .store
            .add(
                CONVERSATIONS,
                DocumentData::new()
                    .field("participants", json!([actor.uid, other.uid]))
                    .field("participantNames", Value::Object(names))
                    .field("participantPhotos", Value::Object(photos))
                    .server_timestamp("createdAt"),
            )
            .await?;
        info!(conversation_id = %id, uid = %actor.uid, other_uid = %other.uid, "conversation created");

        Ok(StartedConversation { id, created: true })
    }

    /// Write a message, then refresh the conversation's last-message cache.
    ///
    /// The receiver is the first participant other than the sender. The two
    /// writes are not atomic: once the message is stored the send succeeds,
    /// and a failed cache update is only logged.
    pub async fn send(
        &self,
        actor: &Actor,
        conversation: &Conversation,
        text: &str,
    ) -> ClientResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::InvalidInput("Message cannot be empty.".to_string()));
        }

        let receiver = conversation
            .other_participant_id(&actor.uid)
            .map(|uid| Value::String(uid.to_string()))
            .unwrap_or(Value::Null);

        let id = self
            .store
            .add(
                MESSAGES,
                DocumentData::new()
                    .field("conversationId", json!(conversation.id))
                    .field("text", json!(text))
                    .field("senderId", json!(actor.uid))
                    .field("senderName", json!(actor.display_name))
                    .field("senderPhoto", json!(actor.photo_or_empty()))
                    .field("receiverId", receiver)
                    .server_timestamp("createdAt"),
            )
            .await?;

        if let Err(e) = self
            .store
            .update(
                CONVERSATIONS,
                &conversation.id,
                DocumentData::new()
                    .field("lastMessage", json!(text))
                    .server_timestamp("lastMessageTime"),
            )
            .await
        {
            warn!(
                conversation_id = %conversation.id,
                message_id = %id,
                error = %e,
                "message stored but last-message cache not updated"
            );
        }
        debug!(conversation_id = %conversation.id, message_id = %id, "message sent");

        Ok(id)
    }

    /// Fetch a conversation that is not in the loaded list
    pub async fn fetch(&self, conversation_id: &str) -> ClientResult<Conversation> {
        let doc = self
            .store
            .get(CONVERSATIONS, conversation_id)
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("conversation {}", conversation_id)))?;
        Ok(decode_conversation(&doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn conversation(id: &str, participants: &[&str]) -> Conversation {
        Conversation {
            id: id.to_string(),
            participants: participants.iter().map(|s| s.to_string()).collect(),
            participant_names: HashMap::new(),
            participant_photos: HashMap::new(),
            last_message: None,
            last_message_time: None,
            created_at: None,
        }
    }

    #[test]
    fn test_find_existing_matches_participant() {
        let loaded = vec![conversation("c1", &["me", "u2"]), conversation("c2", &["me", "u3"])];
        assert_eq!(find_existing(&loaded, "u3").map(|c| c.id.as_str()), Some("c2"));
        assert!(find_existing(&loaded, "u4").is_none());
    }
}
