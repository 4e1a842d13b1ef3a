// Notices: transient user-facing confirmations and failures
//
// Every user action ends in at most one notice, broadcast to whoever renders
// them (the binary logs them, tests assert on them).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    Default,
    Destructive,
}

/// A transient toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Default,
        }
    }

    /// Failure notice carrying the error message verbatim
    pub fn failure(title: impl Into<String>, error: &ClientError) -> Self {
        Self {
            title: title.into(),
            description: error.to_string(),
            variant: NoticeVariant::Destructive,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.variant == NoticeVariant::Destructive
    }
}

/// Broadcast channel of notices
#[derive(Clone)]
pub struct Notifier {
    channel: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity);
        Self { channel }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.channel.subscribe()
    }

    /// Publish a notice; dropped silently when nobody listens
    pub fn publish(&self, notice: Notice) {
        if notice.is_destructive() {
            warn!(title = %notice.title, "{}", notice.description);
        }
        let _ = self.channel.send(notice);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
