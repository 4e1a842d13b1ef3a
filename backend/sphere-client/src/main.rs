use anyhow::{Context, Result};
use document_store::{BlobConfig, InMemoryBackend};
use sphere_client::config::Config;
use sphere_client::domain::FeedStats;
use sphere_client::services::{PostDraft, ViewState};
use sphere_client::SphereClient;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sphere-client");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: env={}, project={}, feed_limit={}",
        config.app.env, config.backend.project_id, config.client.feed_limit
    );

    let backend = InMemoryBackend::new(BlobConfig::new(
        config.backend.storage_bucket.clone(),
        config.backend.storage_base_url.clone(),
    ));
    let client = Arc::new(SphereClient::new(backend.backend(), config.client.clone()));

    // Log notices as they are published
    let mut notices = client.notices();
    let notice_logger = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) if notice.is_destructive() => {
                    warn!(title = %notice.title, "{}", notice.description)
                }
                Ok(notice) => info!(title = %notice.title, "{}", notice.description),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "notice logger lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let demo = &config.demo;
    if client
        .sign_up(&demo.email, &demo.password, &demo.display_name)
        .await
        .is_err()
    {
        client
            .sign_in(&demo.email, &demo.password)
            .await
            .context("Failed to sign in the demo account")?;
    }

    let feed = client.start_feed().await.context("Failed to subscribe to the feed")?;
    let mut feed_state = feed.watch();
    let feed_logger = tokio::spawn(async move {
        while feed_state.changed().await.is_ok() {
            let state = feed_state.borrow_and_update().clone();
            match state {
                ViewState::Loading => info!("feed loading"),
                ViewState::Live(posts) => {
                    let stats = FeedStats::from_posts(&posts);
                    info!(
                        posts = stats.post_count,
                        authors = stats.author_count,
                        likes = stats.total_likes,
                        "feed snapshot"
                    );
                }
                ViewState::Failed(message) => {
                    error!("feed subscription failed: {}", message);
                    break;
                }
            }
        }
    });

    if let Err(e) = client
        .create_post(PostDraft::text("Hello from the headless ConnectSphere client"))
        .await
    {
        error!("Failed to publish welcome post: {}", e);
    }

    info!("sphere-client running; press Ctrl-C to stop");
    shutdown_signal().await;
    info!("Shutting down");

    feed.stop().await;
    feed_logger.abort();
    if let Err(e) = client.sign_out().await {
        warn!("Sign-out failed: {}", e);
    }
    notice_logger.abort();

    Ok(())
}
