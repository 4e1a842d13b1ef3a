use document_store::{BlobConfig, InMemoryBackend};
use sphere_client::config::ClientConfig;
use sphere_client::{Notice, SphereClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

pub fn backend() -> InMemoryBackend {
    InMemoryBackend::new(BlobConfig::new(
        "sphere-test.appspot.com",
        "https://storage.local/v0/b/sphere-test.appspot.com",
    ))
}

pub fn client(backend: &InMemoryBackend) -> Arc<SphereClient> {
    Arc::new(SphereClient::new(backend.backend(), ClientConfig::default()))
}

/// Client on its own auth provider sharing the same documents and blobs
#[allow(dead_code)]
pub fn other_device(backend: &InMemoryBackend) -> Arc<SphereClient> {
    Arc::new(SphereClient::new(backend.other_device(), ClientConfig::default()))
}

pub async fn signed_up(client: &SphereClient, email: &str, name: &str) -> String {
    client
        .sign_up(email, "password123", name)
        .await
        .expect("sign-up failed")
        .user
        .expect("no user after sign-up")
        .uid
}

/// Wait until the watched value satisfies `predicate`
#[allow(dead_code)]
pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, predicate: impl Fn(&T) -> bool) -> T {
    let value = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|v| predicate(v)))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
    value.clone()
}

/// Notices published so far
#[allow(dead_code)]
pub fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}
