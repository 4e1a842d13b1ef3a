/// Live views: a background task that turns live query snapshots into typed state
use document_store::{Document, LiveQuery, Result as StoreResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// State of a live view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    /// Subscribed, first snapshot not received yet
    Loading,
    /// Latest full result set
    Live(Vec<T>),
    /// The subscription ended with an error
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn items(&self) -> &[T] {
        match self {
            ViewState::Live(items) => items,
            _ => &[],
        }
    }
}

pub type Decoder<T> = fn(&Document) -> StoreResult<T>;

/// Typed, continuously replaced view of a live query.
///
/// Each snapshot replaces the whole list. Documents that fail to decode are
/// skipped. Dropping the view stops the task and unsubscribes.
pub struct LiveView<T> {
    name: &'static str,
    state: watch::Receiver<ViewState<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> LiveView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn(name: &'static str, mut live: LiveQuery, decode: Decoder<T>) -> Self {
        let (tx, rx) = watch::channel(ViewState::Loading);

        let task = tokio::spawn(async move {
            while let Some(result) = live.next().await {
                match result {
                    Ok(snapshot) => {
                        let items: Vec<T> = snapshot
                            .documents
                            .iter()
                            .filter_map(|doc| match decode(doc) {
                                Ok(item) => Some(item),
                                Err(e) => {
                                    warn!(view = name, id = %doc.id, error = %e, "skipping malformed document");
                                    None
                                }
                            })
                            .collect();
                        debug!(view = name, count = items.len(), "snapshot applied");
                        tx.send_replace(ViewState::Live(items));
                    }
                    Err(e) => {
                        error!(view = name, error = %e, "live query failed");
                        tx.send_replace(ViewState::Failed(e.to_string()));
                        break;
                    }
                }
            }
        });

        Self {
            name,
            state: rx,
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ViewState<T> {
        self.state.borrow().clone()
    }

    /// Items of the latest snapshot; empty while loading or failed
    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items().to_vec()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<T>> {
        self.state.clone()
    }

    /// Wait until the state satisfies `predicate`.
    ///
    /// Returns the final state if the view task ends first.
    pub async fn wait_for(&self, predicate: impl Fn(&ViewState<T>) -> bool) -> ViewState<T> {
        let mut rx = self.state.clone();
        if let Ok(state) = rx.wait_for(|state| predicate(state)).await {
            return state.clone();
        }
        let last = rx.borrow().clone();
        last
    }

    /// Stop the view and wait until the subscription is released
    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        debug!(view = self.name, "live view stopped");
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
