//! Client facade: the user actions of the app
//!
//! Every action runs through one boundary that
//! - rejects a second submission of the same action while the first is in flight,
//! - turns failures into a destructive [`Notice`] carrying the error verbatim,
//! - publishes the confirmation notice on success.
//!
//! Input the client rejects itself (empty post, no signed-in user, busy) ends
//! the action quietly, as a disabled button would.

use dashmap::DashSet;
use document_store::{Backend, FederatedCredential};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::domain::models::{Comment, Conversation, Message, Post, UserProfile};
use crate::error::{ClientError, ClientResult};
use crate::notify::{Notice, Notifier};
use crate::services::directory::search_screen_results;
use crate::services::{
    ConversationService, DebouncedSearch, DirectoryService, FeedService, ImageUpload, LikeAction,
    LiveView, PostDraft, PostService, ProfileService, SearchState, SessionService, SessionState,
    StartedConversation, ViewState,
};

/// User actions guarded by an in-flight flag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    SignIn,
    SignUp,
    GoogleSignIn,
    CreatePost,
    /// Keyed by post id
    ToggleLike(String),
    /// Keyed by post id
    AddComment(String),
    StartConversation,
    SendMessage,
    SaveProfile,
    UploadAvatar,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::SignIn => "Sign in",
            Action::SignUp => "Sign up",
            Action::GoogleSignIn => "Google sign-in",
            Action::CreatePost => "Create post",
            Action::ToggleLike(_) => "Like",
            Action::AddComment(_) => "Comment",
            Action::StartConversation => "Start conversation",
            Action::SendMessage => "Send message",
            Action::SaveProfile => "Save profile",
            Action::UploadAvatar => "Avatar upload",
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            Action::SignIn | Action::SignUp => "Authentication Error",
            Action::GoogleSignIn => "Google Sign-in Error",
            Action::CreatePost => "Failed to create post",
            Action::ToggleLike(_) | Action::AddComment(_) => "Error",
            Action::StartConversation => "Failed to start conversation",
            Action::SendMessage => "Failed to send message",
            Action::SaveProfile => "Update failed",
            Action::UploadAvatar => "Upload failed",
        }
    }
}

/// Clears the in-flight flag when the action finishes
struct InFlight<'a> {
    actions: &'a DashSet<Action>,
    action: Action,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.actions.remove(&self.action);
    }
}

struct Selection {
    conversation_id: String,
    messages: LiveView<Message>,
}

pub struct SphereClient {
    config: ClientConfig,
    session: SessionService,
    feed: FeedService,
    posts: PostService,
    conversations: ConversationService,
    directory: DirectoryService,
    profile: ProfileService,
    notifier: Notifier,
    in_flight: DashSet<Action>,
    conversation_list: Mutex<Option<LiveView<Conversation>>>,
    selection: Mutex<Option<Selection>>,
}

impl SphereClient {
    pub fn new(backend: Backend, config: ClientConfig) -> Self {
        Self {
            session: SessionService::new(backend.clone()),
            feed: FeedService::new(backend.documents.clone(), config.feed_limit),
            posts: PostService::new(backend.clone()),
            conversations: ConversationService::new(backend.documents.clone()),
            directory: DirectoryService::new(backend.documents.clone()),
            profile: ProfileService::new(backend),
            notifier: Notifier::default(),
            in_flight: DashSet::new(),
            conversation_list: Mutex::new(None),
            selection: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionService {
        &self.session
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    pub fn is_in_flight(&self, action: &Action) -> bool {
        self.in_flight.contains(action)
    }

    fn begin(&self, action: Action) -> ClientResult<InFlight<'_>> {
        if !self.in_flight.insert(action.clone()) {
            debug!(action = action.label(), "action already in flight");
            return Err(ClientError::Busy(action.label().to_string()));
        }
        Ok(InFlight {
            actions: &self.in_flight,
            action,
        })
    }

    async fn perform<T, Fut>(&self, action: Action, work: Fut) -> ClientResult<T>
    where
        Fut: Future<Output = ClientResult<T>>,
    {
        let _in_flight = self.begin(action.clone())?;
        let result = work.await;
        if let Err(e) = &result {
            match e {
                ClientError::InvalidInput(_) | ClientError::Busy(_) | ClientError::Unauthenticated => {
                    debug!(action = action.label(), error = %e, "action rejected")
                }
                _ => self.notifier.publish(Notice::failure(action.failure_title(), e)),
            }
        }
        result
    }

    fn confirm(&self, title: &str, description: impl Into<String>) {
        self.notifier.publish(Notice::success(title, description));
    }

    // ==================== Session ====================

    pub async fn restore_session(&self) -> ClientResult<SessionState> {
        self.session.restore().await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<SessionState> {
        let state = self
            .perform(Action::SignIn, self.session.sign_in(email, password))
            .await?;
        self.confirm("Welcome back!", "You've successfully signed in to ConnectSphere.");
        Ok(state)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> ClientResult<SessionState> {
        let state = self
            .perform(
                Action::SignUp,
                self.session.sign_up(email, password, display_name),
            )
            .await?;
        self.confirm(
            "Account created!",
            "Welcome to ConnectSphere! Your account has been created successfully.",
        );
        Ok(state)
    }

    pub async fn sign_in_with_google(
        &self,
        credential: FederatedCredential,
    ) -> ClientResult<SessionState> {
        let state = self
            .perform(
                Action::GoogleSignIn,
                self.session.sign_in_with_google(credential),
            )
            .await?;
        self.confirm("Welcome!", "You've successfully signed in with Google.");
        Ok(state)
    }

    /// Tear down messaging subscriptions and sign out
    pub async fn sign_out(&self) -> ClientResult<()> {
        self.close_messaging().await;
        if let Err(e) = self.session.sign_out().await {
            warn!(error = %e, "sign-out failed");
            return Err(e);
        }
        Ok(())
    }

    // ==================== Feed and posts ====================

    /// Live feed; stopping or dropping the view unsubscribes
    pub async fn start_feed(&self) -> ClientResult<LiveView<Post>> {
        self.feed.start().await
    }

    pub async fn create_post(&self, draft: PostDraft) -> ClientResult<String> {
        let id = self
            .perform(Action::CreatePost, async {
                let actor = self.session.actor()?;
                self.posts.create_post(&actor, draft).await
            })
            .await?;
        self.confirm("Post created!", "Your post has been shared successfully.");
        Ok(id)
    }

    /// Like or unlike, decided from `post` as last seen by this client
    pub async fn toggle_like(&self, post: &Post) -> ClientResult<LikeAction> {
        self.perform(Action::ToggleLike(post.id.clone()), async {
            let user = self.session.require_user()?;
            self.posts.toggle_like(&user.uid, post).await
        })
        .await
    }

    pub async fn add_comment(&self, post_id: &str, text: &str) -> ClientResult<Comment> {
        let comment = self
            .perform(Action::AddComment(post_id.to_string()), async {
                let actor = self.session.actor()?;
                self.posts.add_comment(&actor, post_id, text).await
            })
            .await?;
        self.confirm("Comment added!", "Your comment has been posted successfully.");
        Ok(comment)
    }

    // ==================== Messaging ====================

    /// Subscribe to the signed-in user's conversations
    pub async fn open_messaging(&self) -> ClientResult<()> {
        let user = self.session.require_user()?;
        let view = self.conversations.subscribe(&user.uid).await?;
        let mut list = self.conversation_list.lock().await;
        if let Some(previous) = list.replace(view) {
            previous.stop().await;
        }
        info!(uid = %user.uid, "messaging opened");
        Ok(())
    }

    pub async fn close_messaging(&self) {
        self.clear_selection().await;
        if let Some(view) = self.conversation_list.lock().await.take() {
            view.stop().await;
        }
    }

    /// Conversations as last pushed; empty before the first snapshot
    pub async fn conversations(&self) -> Vec<Conversation> {
        match self.conversation_list.lock().await.as_ref() {
            Some(view) => view.items(),
            None => Vec::new(),
        }
    }

    pub async fn conversations_watch(&self) -> Option<watch::Receiver<ViewState<Conversation>>> {
        self.conversation_list.lock().await.as_ref().map(|v| v.watch())
    }

    /// Reuse a loaded conversation with `other` or create one, then select it
    pub async fn start_conversation(&self, other: &UserProfile) -> ClientResult<StartedConversation> {
        let started = self
            .perform(Action::StartConversation, async {
                let actor = self.session.actor()?;
                let loaded = self.conversations().await;
                let started = self.conversations.start(&actor, &loaded, other).await?;
                self.select_conversation(Some(started.id.as_str())).await?;
                Ok(started)
            })
            .await?;
        if started.created {
            self.confirm(
                "Conversation started",
                format!("Started conversation with {}", other.display_name),
            );
        }
        Ok(started)
    }

    /// Switch the message subscription; `None` clears the selection
    pub async fn select_conversation(&self, conversation_id: Option<&str>) -> ClientResult<()> {
        let mut selection = self.selection.lock().await;
        if let Some(previous) = selection.take() {
            previous.messages.stop().await;
        }
        if let Some(id) = conversation_id {
            let messages = self.conversations.messages(id).await?;
            *selection = Some(Selection {
                conversation_id: id.to_string(),
                messages,
            });
        }
        Ok(())
    }

    async fn clear_selection(&self) {
        if let Some(previous) = self.selection.lock().await.take() {
            previous.messages.stop().await;
        }
    }

    pub async fn selected_conversation(&self) -> Option<String> {
        self.selection
            .lock()
            .await
            .as_ref()
            .map(|s| s.conversation_id.clone())
    }

    /// Messages of the selected conversation, oldest first
    pub async fn messages(&self) -> Vec<Message> {
        match self.selection.lock().await.as_ref() {
            Some(selection) => selection.messages.items(),
            None => Vec::new(),
        }
    }

    pub async fn messages_watch(&self) -> Option<watch::Receiver<ViewState<Message>>> {
        self.selection
            .lock()
            .await
            .as_ref()
            .map(|s| s.messages.watch())
    }

    /// Send to the selected conversation
    pub async fn send_message(&self, text: &str) -> ClientResult<String> {
        self.perform(Action::SendMessage, async {
            let actor = self.session.actor()?;
            let conversation_id = self
                .selected_conversation()
                .await
                .ok_or_else(|| ClientError::InvalidInput("No conversation selected.".to_string()))?;

            let loaded = self.conversations().await;
            let conversation = match loaded.into_iter().find(|c| c.id == conversation_id) {
                Some(conversation) => conversation,
                None => self.conversations.fetch(&conversation_id).await?,
            };
            self.conversations.send(&actor, &conversation, text).await
        })
        .await
    }

    // ==================== Directory ====================

    /// Messaging-screen user search: refetches users on every query
    pub async fn search_users(&self, query: &str) -> ClientResult<Vec<UserProfile>> {
        let user = self.session.require_user()?;
        match self.directory.search_for_messaging(&user.uid, query).await {
            Ok(users) => Ok(users),
            Err(e) => {
                self.notifier.publish(Notice::failure("Search failed", &e));
                Err(e)
            }
        }
    }

    /// Debounced picker over [`SphereClient::search_users`]
    pub fn user_picker(self: &Arc<Self>) -> DebouncedSearch {
        let client = Arc::clone(self);
        DebouncedSearch::spawn(
            self.config.search_debounce(),
            SearchState::default(),
            move |query| {
                let client = client.clone();
                async move { client.search_users(&query).await }
            },
        )
    }

    /// Search screen: users are loaded once, keystrokes filter that list
    pub async fn open_search_screen(&self) -> ClientResult<DebouncedSearch> {
        let user = self.session.require_user()?;
        let users = Arc::new(self.directory.load_all(&user.uid).await?);
        let initial = self.config.search_initial_results;

        let first_page = SearchState {
            query: String::new(),
            results: search_screen_results(&users, "", initial),
            pending: false,
            error: None,
        };
        Ok(DebouncedSearch::spawn(
            self.config.search_debounce(),
            first_page,
            move |query| {
                let users = users.clone();
                async move { Ok(search_screen_results(&users, &query, initial)) }
            },
        ))
    }

    // ==================== Profile ====================

    pub async fn save_profile(&self, display_name: &str, bio: &str) -> ClientResult<()> {
        self.perform(Action::SaveProfile, async {
            let user = self.session.require_user()?;
            self.profile.save(&user.uid, display_name, bio).await?;
            self.session.refresh_profile().await?;
            Ok(())
        })
        .await?;
        self.confirm("Profile updated!", "Your profile has been successfully updated.");
        Ok(())
    }

    pub async fn upload_avatar(&self, image: ImageUpload) -> ClientResult<String> {
        let url = self
            .perform(Action::UploadAvatar, async {
                let user = self.session.require_user()?;
                let url = self.profile.upload_avatar(&user.uid, image).await?;
                self.session.refresh_profile().await?;
                Ok(url)
            })
            .await?;
        self.confirm(
            "Profile picture updated!",
            "Your profile picture has been successfully updated.",
        );
        Ok(url)
    }

    /// Live view of the signed-in user's posts
    pub async fn own_posts(&self) -> ClientResult<LiveView<Post>> {
        let user = self.session.require_user()?;
        self.profile.own_posts(&user.uid).await
    }
}
