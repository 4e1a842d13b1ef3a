/// User directory: full scans of `users` filtered on the client
use document_store::{DocumentStore, Query};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::models::{UserProfile, USERS};
use crate::error::ClientResult;

/// Users whose display name, email (and bio when asked) contain `query`, case-insensitively.
///
/// The query is matched as typed; surrounding whitespace is significant.
pub fn filter_users(users: &[UserProfile], query: &str, include_bio: bool) -> Vec<UserProfile> {
    let needle = query.to_lowercase();
    users
        .iter()
        .filter(|u| u.matches(&needle, include_bio))
        .cloned()
        .collect()
}

/// Search screen results: the first `initial` users for an empty query
pub fn search_screen_results(users: &[UserProfile], query: &str, initial: usize) -> Vec<UserProfile> {
    if query.trim().is_empty() {
        users.iter().take(initial).cloned().collect()
    } else {
        filter_users(users, query, true)
    }
}

#[derive(Clone)]
pub struct DirectoryService {
    store: Arc<dyn DocumentStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Every user except `exclude_uid`
    pub async fn load_all(&self, exclude_uid: &str) -> ClientResult<Vec<UserProfile>> {
        let docs = self.store.query(&Query::collection(USERS)).await?;
        let users: Vec<UserProfile> = docs
            .iter()
            .filter_map(|doc| match doc.decode_with_id::<UserProfile>("uid") {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping malformed user document");
                    None
                }
            })
            .filter(|u| u.uid != exclude_uid)
            .collect();
        debug!(count = users.len(), "users loaded");
        Ok(users)
    }

    /// Messaging-screen search: refetch, match name and email only.
    /// An empty query yields nothing.
    pub async fn search_for_messaging(
        &self,
        exclude_uid: &str,
        query: &str,
    ) -> ClientResult<Vec<UserProfile>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let users = self.load_all(exclude_uid).await?;
        Ok(filter_users(&users, query, false))
    }
}

/// Latest search outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    /// Query the results belong to
    pub query: String,
    pub results: Vec<UserProfile>,
    /// A keystroke is waiting out the debounce or a search is running
    pub pending: bool,
    pub error: Option<String>,
}

/// Keystroke-debounced search.
///
/// Each keystroke restarts the timer; only the query still current when the
/// timer fires is searched.
pub struct DebouncedSearch {
    input: watch::Sender<String>,
    state: Arc<watch::Sender<SearchState>>,
    task: JoinHandle<()>,
}

impl DebouncedSearch {
    pub fn spawn<F, Fut>(debounce: Duration, initial: SearchState, search: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<Vec<UserProfile>>> + Send + 'static,
    {
        let (input, mut input_rx) = watch::channel(String::new());
        let (state, _) = watch::channel(initial);
        let state = Arc::new(state);
        let state_tx = state.clone();

        let task = tokio::spawn(async move {
            while input_rx.changed().await.is_ok() {
                state_tx.send_modify(|s| s.pending = true);

                // Restart the timer on every keystroke
                loop {
                    tokio::select! {
                        changed = input_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        _ = tokio::time::sleep(debounce) => break,
                    }
                }

                let query = input_rx.borrow_and_update().clone();
                debug!(query = %query, "running debounced search");
                let outcome = search(query.clone()).await;

                // A keystroke that landed mid-search keeps the state pending
                let pending = input_rx.has_changed().unwrap_or(false);
                let next = match outcome {
                    Ok(results) => SearchState {
                        query,
                        results,
                        pending,
                        error: None,
                    },
                    Err(e) => SearchState {
                        query,
                        results: Vec::new(),
                        pending,
                        error: Some(e.to_string()),
                    },
                };
                state_tx.send_replace(next);
            }
        });

        Self { input, state, task }
    }

    /// Record a keystroke (the full current query); the state is pending
    /// until a search for it finishes
    pub fn set_query(&self, query: impl Into<String>) {
        self.input.send_replace(query.into());
        self.state.send_modify(|s| s.pending = true);
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Wait for the next settled result
    pub async fn settled(&self) -> SearchState {
        let mut rx = self.state.subscribe();
        if let Ok(state) = rx.wait_for(|s| !s.pending).await {
            return state.clone();
        }
        let last = rx.borrow().clone();
        last
    }
}

impl Drop for DebouncedSearch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, name: &str, email: &str, bio: Option<&str>) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            display_name: name.to_string(),
            email: email.to_string(),
            photo_url: None,
            bio: bio.map(str::to_string),
            created_at: None,
        }
    }

    fn fixture() -> Vec<UserProfile> {
        vec![
            user("u1", "Ada Lovelace", "ada@example.com", Some("Poetical science")),
            user("u2", "Grace Hopper", "grace@navy.mil", Some("Compilers")),
            user("u3", "Alan Turing", "alan@bletchley.uk", None),
            user("u4", "Edsger Dijkstra", "ewd@utexas.edu", Some("Science of programming")),
        ]
    }

    fn uids(users: &[UserProfile]) -> Vec<&str> {
        users.iter().map(|u| u.uid.as_str()).collect()
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let users = fixture();
        assert_eq!(uids(&filter_users(&users, "GRACE", true)), vec!["u2"]);
        assert_eq!(uids(&filter_users(&users, "a", false)), vec!["u1", "u2", "u3", "u4"]);
        assert_eq!(uids(&filter_users(&users, ".uk", false)), vec!["u3"]);
    }

    #[test]
    fn test_query_whitespace_is_not_trimmed() {
        let users = fixture();
        assert!(filter_users(&users, "lovelace ", false).is_empty());
        assert_eq!(uids(&filter_users(&users, "LOVELACE", false)), vec!["u1"]);
        assert_eq!(uids(&filter_users(&users, "ada lovelace", false)), vec!["u1"]);
    }

    #[test]
    fn test_bio_only_matches_on_search_screen() {
        let users = fixture();
        assert_eq!(uids(&filter_users(&users, "science", true)), vec!["u1", "u4"]);
        assert!(filter_users(&users, "science", false).is_empty());
    }

    #[test]
    fn test_empty_query_shows_initial_slice() {
        let users = fixture();
        assert_eq!(uids(&search_screen_results(&users, "  ", 2)), vec!["u1", "u2"]);
        assert_eq!(uids(&search_screen_results(&users, "turing", 2)), vec!["u3"]);
    }
}
