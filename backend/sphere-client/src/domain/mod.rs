pub mod models;

pub use models::{
    Comment, Conversation, FeedStats, Message, ParticipantSummary, Post, ProfileStats, UserProfile,
};
