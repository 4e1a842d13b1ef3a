use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Collection names
pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const CONVERSATIONS: &str = "conversations";
pub const MESSAGES: &str = "messages";

/// Name written for authors and senders whose profile is not loaded
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Name shown for a conversation partner missing from `participantNames`
pub const UNKNOWN_PARTICIPANT: &str = "Unknown";

/// User profile document (`users/{uid}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Case-insensitive substring match on display name and email, plus bio when asked.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str, include_bio: bool) -> bool {
        self.display_name.to_lowercase().contains(needle)
            || self.email.to_lowercase().contains(needle)
            || (include_bio
                && self
                    .bio
                    .as_deref()
                    .map(|bio| bio.to_lowercase().contains(needle))
                    .unwrap_or(false))
    }
}

/// Comment embedded in a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Client clock in epoch millis, as a string
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub author_photo: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Post document (`posts/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_photo: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn is_liked_by(&self, uid: &str) -> bool {
        self.likes.iter().any(|liker| liker == uid)
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Comments in display order: newest first, whatever the stored order
    pub fn comments_newest_first(&self) -> Vec<&Comment> {
        let mut comments: Vec<&Comment> = self.comments.iter().collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        comments
    }
}

/// Conversation document (`conversations/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_names: HashMap<String, String>,
    #[serde(default)]
    pub participant_photos: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// The conversation partner as seen by one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSummary {
    pub uid: String,
    pub name: String,
    pub photo: Option<String>,
}

impl Conversation {
    pub fn includes(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }

    /// First participant that is not `me`
    pub fn other_participant_id(&self, me: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != me)
    }

    pub fn other_participant(&self, me: &str) -> Option<ParticipantSummary> {
        let uid = self.other_participant_id(me)?;
        Some(ParticipantSummary {
            uid: uid.to_string(),
            name: self
                .participant_names
                .get(uid)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
            photo: self
                .participant_photos
                .get(uid)
                .filter(|photo| !photo.is_empty())
                .cloned(),
        })
    }
}

/// Message document (`messages/{id}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub conversation_id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_photo: String,
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Quick stats shown above the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub post_count: usize,
    pub author_count: usize,
    pub total_likes: usize,
}

impl FeedStats {
    pub fn from_posts(posts: &[Post]) -> Self {
        let authors: HashSet<&str> = posts.iter().map(|p| p.author_id.as_str()).collect();
        Self {
            post_count: posts.len(),
            author_count: authors.len(),
            total_likes: posts.iter().map(Post::like_count).sum(),
        }
    }
}

/// Totals over a user's own posts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileStats {
    pub post_count: usize,
    pub likes_received: usize,
    pub comments_received: usize,
}

impl ProfileStats {
    pub fn from_posts(posts: &[Post]) -> Self {
        Self {
            post_count: posts.len(),
            likes_received: posts.iter().map(Post::like_count).sum(),
            comments_received: posts.iter().map(Post::comment_count).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn comment(id: &str, millis: i64) -> Comment {
        Comment {
            id: id.to_string(),
            text: format!("comment {}", id),
            author_id: "u1".to_string(),
            author_name: "Ada".to_string(),
            author_photo: String::new(),
            created_at: at(millis),
        }
    }

    #[test]
    fn test_comments_render_newest_first() {
        let post = Post {
            id: "p1".to_string(),
            content: "hello".to_string(),
            image_url: None,
            author_id: "u1".to_string(),
            author_name: "Ada".to_string(),
            author_photo: None,
            created_at: at(1),
            likes: vec![],
            comments: vec![comment("a", 200), comment("b", 100), comment("c", 300)],
        };

        let ids: Vec<&str> = post
            .comments_newest_first()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        // Stored order untouched
        assert_eq!(post.comments[0].id, "a");
    }

    #[test]
    fn test_post_wire_format() {
        let post: Post = serde_json::from_value(json!({
            "id": "p1",
            "content": "hi",
            "imageURL": null,
            "authorId": "u1",
            "authorName": "Ada",
            "authorPhoto": null,
            "createdAt": 1_700_000_000_000i64,
            "likes": ["u2"],
            "comments": [{
                "id": "1700000000001",
                "text": "nice",
                "authorId": "u2",
                "authorName": "Bob",
                "authorPhoto": "",
                "createdAt": 1_700_000_000_001i64
            }]
        }))
        .unwrap();

        assert!(post.is_liked_by("u2"));
        assert!(!post.is_liked_by("u1"));
        assert_eq!(post.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(post.comments[0].author_name, "Bob");
    }

    #[test]
    fn test_other_participant_summary() {
        let conversation: Conversation = serde_json::from_value(json!({
            "id": "c1",
            "participants": ["u1", "u2"],
            "participantNames": { "u1": "Ada" },
            "participantPhotos": { "u1": "", "u2": "" }
        }))
        .unwrap();

        let other = conversation.other_participant("u1").unwrap();
        assert_eq!(other.uid, "u2");
        assert_eq!(other.name, UNKNOWN_PARTICIPANT);
        assert_eq!(other.photo, None);

        let other = conversation.other_participant("u2").unwrap();
        assert_eq!(other.name, "Ada");
    }

    #[test]
    fn test_search_match_fields() {
        let user = UserProfile {
            uid: "u1".to_string(),
            display_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            photo_url: None,
            bio: Some("Analytical Engine".to_string()),
            created_at: None,
        };
        assert!(user.matches("lovelace", false));
        assert!(user.matches("example", false));
        assert!(!user.matches("engine", false));
        assert!(user.matches("engine", true));
    }

    #[test]
    fn test_feed_and_profile_stats() {
        let mut a = Post {
            id: "p1".to_string(),
            content: "a".to_string(),
            image_url: None,
            author_id: "u1".to_string(),
            author_name: "Ada".to_string(),
            author_photo: None,
            created_at: at(1),
            likes: vec!["u2".to_string(), "u3".to_string()],
            comments: vec![comment("x", 1)],
        };
        let mut b = a.clone();
        b.id = "p2".to_string();
        b.likes = vec!["u1".to_string()];
        let mut c = a.clone();
        c.id = "p3".to_string();
        c.author_id = "u2".to_string();
        a.comments.push(comment("y", 2));

        let feed = FeedStats::from_posts(&[a.clone(), b.clone(), c]);
        assert_eq!(feed.post_count, 3);
        assert_eq!(feed.author_count, 2);
        assert_eq!(feed.total_likes, 5);

        let profile = ProfileStats::from_posts(&[a, b]);
        assert_eq!(profile.likes_received, 3);
        assert_eq!(profile.comments_received, 3);
    }
}
