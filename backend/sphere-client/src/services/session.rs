/// Session provider: authentication plus the signed-in user's profile document
use document_store::{AuthUser, Backend, DocumentData, FederatedCredential};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::models::{UserProfile, DEFAULT_DISPLAY_NAME, USERS};
use crate::error::{ClientError, ClientResult};

/// Watchable session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// True until the initial auth state has been resolved
    pub loading: bool,
    pub user: Option<AuthUser>,
    pub profile: Option<UserProfile>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            loading: true,
            user: None,
            profile: None,
        }
    }
}

/// The signed-in user as written into denormalized fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

impl Actor {
    /// Missing or empty profile values fall back to `"User"` and no photo
    pub fn new(user: &AuthUser, profile: Option<&UserProfile>) -> Self {
        Self {
            uid: user.uid.clone(),
            display_name: profile
                .map(|p| p.display_name.clone())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            photo_url: profile
                .and_then(|p| p.photo_url.clone())
                .filter(|url| !url.is_empty()),
        }
    }

    /// Photo for fields that store an empty string when unset
    pub fn photo_or_empty(&self) -> String {
        self.photo_url.clone().unwrap_or_default()
    }
}

pub struct SessionService {
    backend: Backend,
    state: watch::Sender<SessionState>,
}

impl SessionService {
    pub fn new(backend: Backend) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { backend, state }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().user.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.borrow().profile.clone()
    }

    pub fn require_user(&self) -> ClientResult<AuthUser> {
        self.current_user().ok_or(ClientError::Unauthenticated)
    }

    /// Signed-in user with denormalization defaults applied
    pub fn actor(&self) -> ClientResult<Actor> {
        let state = self.state.borrow();
        let user = state.user.as_ref().ok_or(ClientError::Unauthenticated)?;
        Ok(Actor::new(user, state.profile.as_ref()))
    }

    /// Resolve the initial auth state (a user may already be signed in)
    pub async fn restore(&self) -> ClientResult<SessionState> {
        let user = self.backend.auth.current_user();
        self.publish(user).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<SessionState> {
        let user = self.backend.auth.sign_in_with_email(email, password).await?;
        self.publish(Some(user)).await
    }

    /// Create the account, set its display name and write `users/{uid}`.
    ///
    /// Once the account exists the provider is signed in, so a later failure
    /// still publishes that user before the error is returned.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> ClientResult<SessionState> {
        self.backend.auth.create_user_with_email(email, password).await?;
        match self.create_profile(display_name).await {
            Ok(user) => self.publish(Some(user)).await,
            Err(e) => self.publish_after_failure(e).await,
        }
    }

    async fn create_profile(&self, display_name: &str) -> ClientResult<AuthUser> {
        let user = self
            .backend
            .auth
            .update_profile(Some(display_name.to_string()), None)
            .await?;

        self.backend
            .documents
            .set(
                USERS,
                &user.uid,
                DocumentData::new()
                    .field("uid", json!(user.uid))
                    .field("email", json!(user.email))
                    .field("displayName", json!(display_name))
                    .server_timestamp("createdAt"),
            )
            .await?;
        info!(uid = %user.uid, "user profile created");
        Ok(user)
    }

    /// Google sign-in; the profile document is created on first sign-in only
    pub async fn sign_in_with_google(
        &self,
        credential: FederatedCredential,
    ) -> ClientResult<SessionState> {
        let outcome = self.backend.auth.sign_in_with_credential(credential).await?;
        let user = outcome.user;

        if self.backend.documents.get(USERS, &user.uid).await?.is_none() {
            let mut data = DocumentData::new()
                .field("uid", json!(user.uid))
                .field("email", json!(user.email))
                .field(
                    "displayName",
                    json!(user
                        .display_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())),
                )
                .server_timestamp("createdAt");
            if let Some(photo) = &user.photo_url {
                data = data.field("photoURL", json!(photo));
            }
            if let Err(e) = self.backend.documents.set(USERS, &user.uid, data).await {
                return self.publish_after_failure(e.into()).await;
            }
            info!(uid = %user.uid, "user profile created on first federated sign-in");
        }

        self.publish(Some(user)).await
    }

    pub async fn sign_out(&self) -> ClientResult<()> {
        self.backend.auth.sign_out().await?;
        self.state.send_replace(SessionState {
            loading: false,
            user: None,
            profile: None,
        });
        Ok(())
    }

    /// Reload the profile document after an edit
    pub async fn refresh_profile(&self) -> ClientResult<Option<UserProfile>> {
        let user = self.require_user()?;
        let profile = self.load_profile(&user.uid).await?;
        self.state.send_modify(|state| state.profile = profile.clone());
        Ok(profile)
    }

    async fn load_profile(&self, uid: &str) -> ClientResult<Option<UserProfile>> {
        match self.backend.documents.get(USERS, uid).await? {
            Some(doc) => match doc.decode_with_id::<UserProfile>("uid") {
                Ok(profile) => Ok(Some(profile)),
                Err(e) => {
                    warn!(uid = %uid, error = %e, "unreadable profile document");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// The provider is signed in even though a later step failed; mirror it
    /// before reporting `err`.
    async fn publish_after_failure(&self, err: ClientError) -> ClientResult<SessionState> {
        let user = self.backend.auth.current_user();
        warn!(
            uid = user.as_ref().map(|u| u.uid.as_str()).unwrap_or_default(),
            error = %err,
            "signed in but profile setup failed"
        );
        if let Err(e) = self.publish(user.clone()).await {
            warn!(error = %e, "failed to load profile after partial sign-in");
            self.state.send_replace(SessionState {
                loading: false,
                user,
                profile: None,
            });
        }
        Err(err)
    }

    async fn publish(&self, user: Option<AuthUser>) -> ClientResult<SessionState> {
        let profile = match &user {
            Some(user) => self.load_profile(&user.uid).await?,
            None => None,
        };
        let state = SessionState {
            loading: false,
            user,
            profile,
        };
        self.state.send_replace(state.clone());
        Ok(state)
    }
}
