pub mod conversations;
pub mod directory;
pub mod feed;
pub mod live;
pub mod posts;
pub mod profile;
pub mod session;

pub use conversations::{ConversationService, StartedConversation};
pub use directory::{DebouncedSearch, DirectoryService, SearchState};
pub use feed::FeedService;
pub use live::{LiveView, ViewState};
pub use posts::{ImageUpload, LikeAction, PostDraft, PostService};
pub use profile::ProfileService;
pub use session::{Actor, SessionService, SessionState};
