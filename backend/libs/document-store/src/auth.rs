/// Authentication provider: email/password accounts and federated sign-in
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::Result;

pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInProvider {
    Password,
    Google,
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub provider: SignInProvider,
    pub created_at: DateTime<Utc>,
}

/// Identity asserted by an external provider (Google popup result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedCredential {
    pub provider: SignInProvider,
    /// Provider-side account id
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl FederatedCredential {
    pub fn google(subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            provider: SignInProvider::Google,
            subject: subject.into(),
            email: email.into(),
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_profile(mut self, display_name: impl Into<String>, photo_url: Option<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.photo_url = photo_url;
        self
    }
}

/// Result of a sign-in
#[derive(Debug, Clone, PartialEq)]
pub struct SignInOutcome {
    pub user: AuthUser,
    /// True when the sign-in created the account
    pub is_new_user: bool,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn create_user_with_email(&self, email: &str, password: &str) -> Result<AuthUser>;

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Sign in with an external credential, creating the account on first use
    async fn sign_in_with_credential(&self, credential: FederatedCredential) -> Result<SignInOutcome>;

    /// Update the signed-in user's display name and/or photo URL
    async fn update_profile(
        &self,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<AuthUser>;

    async fn sign_out(&self) -> Result<()>;

    fn current_user(&self) -> Option<AuthUser>;

    /// Auth state changes; the current value is the signed-in user
    fn watch(&self) -> watch::Receiver<Option<AuthUser>>;
}

struct Account {
    user: AuthUser,
    // None for federated-only accounts
    password_hash: Option<String>,
}

/// Auth provider kept in memory
pub struct InMemoryAuthProvider {
    // lowercase email -> account
    accounts: RwLock<HashMap<String, Account>>,
    state: watch::Sender<Option<AuthUser>>,
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: RwLock::new(HashMap::new()),
            state,
        }
    }

    fn set_current(&self, user: Option<AuthUser>) {
        self.state.send_replace(user);
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

fn validate_email(email: &str) -> Result<()> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(StoreError::auth("invalid-email", "The email address is badly formatted."))
    }
}

fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(StoreError::auth(
            "weak-password",
            "Password should be at least 6 characters",
        ));
    }

    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StoreError::auth("internal-error", "Failed to hash password"))
}

fn verify_password(password: &str, hash: &str) -> Result<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| StoreError::auth("internal-error", "Invalid password hash format"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| invalid_credential())
}

fn invalid_credential() -> StoreError {
    StoreError::auth("invalid-credential", "The supplied auth credential is incorrect.")
}

fn generate_uid() -> String {
    let mut uid = Uuid::new_v4().simple().to_string();
    uid.truncate(28);
    uid
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn create_user_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        validate_email(email)?;
        let key = email.to_lowercase();

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(StoreError::auth(
                "email-already-in-use",
                "The email address is already in use by another account.",
            ));
        }

        let password_hash = hash_password(password)?;
        let user = AuthUser {
            uid: generate_uid(),
            email: email.to_string(),
            display_name: None,
            photo_url: None,
            provider: SignInProvider::Password,
            created_at: Utc::now(),
        };
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password_hash: Some(password_hash),
            },
        );
        drop(accounts);

        info!(uid = %user.uid, "account created");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        validate_email(email)?;
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&email.to_lowercase())
            .ok_or_else(invalid_credential)?;
        let hash = account.password_hash.as_deref().ok_or_else(invalid_credential)?;
        if let Err(e) = verify_password(password, hash) {
            warn!(uid = %account.user.uid, "password sign-in rejected");
            return Err(e);
        }

        let user = account.user.clone();
        drop(accounts);

        info!(uid = %user.uid, "signed in with password");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in_with_credential(&self, credential: FederatedCredential) -> Result<SignInOutcome> {
        validate_email(&credential.email)?;
        let key = credential.email.to_lowercase();

        let mut accounts = self.accounts.write().await;
        let outcome = match accounts.get(&key) {
            Some(account) if account.user.provider == credential.provider => SignInOutcome {
                user: account.user.clone(),
                is_new_user: false,
            },
            Some(_) => {
                return Err(StoreError::auth(
                    "account-exists-with-different-credential",
                    "An account already exists with the same email address but different sign-in credentials.",
                ));
            }
            None => {
                let user = AuthUser {
                    uid: generate_uid(),
                    email: credential.email.clone(),
                    display_name: credential.display_name.clone(),
                    photo_url: credential.photo_url.clone(),
                    provider: credential.provider,
                    created_at: Utc::now(),
                };
                accounts.insert(
                    key,
                    Account {
                        user: user.clone(),
                        password_hash: None,
                    },
                );
                SignInOutcome {
                    user,
                    is_new_user: true,
                }
            }
        };
        drop(accounts);

        info!(
            uid = %outcome.user.uid,
            subject = %credential.subject,
            new_user = outcome.is_new_user,
            "signed in with federated credential"
        );
        self.set_current(Some(outcome.user.clone()));
        Ok(outcome)
    }

    async fn update_profile(
        &self,
        display_name: Option<String>,
        photo_url: Option<String>,
    ) -> Result<AuthUser> {
        let current = self
            .current_user()
            .ok_or_else(|| StoreError::auth("no-current-user", "No user currently signed in."))?;

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&current.email.to_lowercase())
            .ok_or_else(|| StoreError::auth("user-not-found", "There is no user record corresponding to this identifier."))?;
        if display_name.is_some() {
            account.user.display_name = display_name;
        }
        if photo_url.is_some() {
            account.user.photo_url = photo_url;
        }
        let user = account.user.clone();
        drop(accounts);

        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(user) = self.current_user() {
            info!(uid = %user.uid, "signed out");
        }
        self.set_current(None);
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_sign_in() {
        let auth = InMemoryAuthProvider::new();
        let created = auth
            .create_user_with_email("ada@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(auth.current_user().unwrap().uid, created.uid);

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());

        let user = auth
            .sign_in_with_email("ADA@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(user.uid, created.uid);
    }

    #[tokio::test]
    async fn test_error_codes() {
        let auth = InMemoryAuthProvider::new();

        let err = auth.create_user_with_email("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.auth_code(), Some("invalid-email"));

        let err = auth.create_user_with_email("a@example.com", "123").await.unwrap_err();
        assert_eq!(err.auth_code(), Some("weak-password"));

        auth.create_user_with_email("a@example.com", "secret1").await.unwrap();
        let err = auth.create_user_with_email("a@example.com", "secret1").await.unwrap_err();
        assert_eq!(err.auth_code(), Some("email-already-in-use"));

        let err = auth.sign_in_with_email("a@example.com", "wrong-pass").await.unwrap_err();
        assert_eq!(err.auth_code(), Some("invalid-credential"));
        assert_eq!(
            err.to_string(),
            "The supplied auth credential is incorrect. (auth/invalid-credential)"
        );
    }

    #[tokio::test]
    async fn test_federated_sign_in_creates_account_once() {
        let auth = InMemoryAuthProvider::new();
        let credential = FederatedCredential::google("g-1", "grace@example.com")
            .with_profile("Grace", Some("https://photos/grace.png".to_string()));

        let first = auth.sign_in_with_credential(credential.clone()).await.unwrap();
        assert!(first.is_new_user);
        assert_eq!(first.user.display_name.as_deref(), Some("Grace"));

        let second = auth.sign_in_with_credential(credential).await.unwrap();
        assert!(!second.is_new_user);
        assert_eq!(second.user.uid, first.user.uid);
        assert_eq!(auth.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_watch_and_profile_update() {
        let auth = InMemoryAuthProvider::new();
        let mut rx = auth.watch();
        assert!(rx.borrow().is_none());

        auth.create_user_with_email("b@example.com", "secret1").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());

        let user = auth
            .update_profile(Some("Bea".to_string()), None)
            .await
            .unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Bea"));
        assert_eq!(auth.current_user().unwrap().display_name.as_deref(), Some("Bea"));
    }
}
