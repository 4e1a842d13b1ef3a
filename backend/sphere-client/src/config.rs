/// Configuration management for the ConnectSphere client
///
/// Loads configuration from environment variables (and `.env` when present).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Backend project and storage settings
    pub backend: BackendConfig,
    /// Feed and search tuning
    pub client: ClientConfig,
    /// Account used by the headless binary
    pub demo: DemoAccountConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub project_id: String,
    /// Blob storage bucket
    pub storage_bucket: String,
    /// Base of public download URLs
    pub storage_base_url: String,
}

/// Client behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Number of posts in the feed live query
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,
    /// Keystroke debounce for user search
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Users shown by the search screen for an empty query
    #[serde(default = "default_search_initial_results")]
    pub search_initial_results: usize,
}

/// Demo account for the headless session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoAccountConfig {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

// Default values
fn default_feed_limit() -> usize {
    20
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_search_initial_results() -> usize {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            feed_limit: default_feed_limit(),
            search_debounce_ms: default_search_debounce_ms(),
            search_initial_results: default_search_initial_results(),
        }
    }
}

impl ClientConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        };

        let project_id = std::env::var("SPHERE_PROJECT_ID")
            .unwrap_or_else(|_| "connectsphere-local".to_string());
        let storage_bucket = std::env::var("SPHERE_STORAGE_BUCKET")
            .unwrap_or_else(|_| format!("{}.appspot.com", project_id));
        let storage_base_url = std::env::var("SPHERE_STORAGE_BASE_URL")
            .unwrap_or_else(|_| format!("https://storage.local/v0/b/{}", storage_bucket));
        let backend = BackendConfig {
            project_id,
            storage_bucket,
            storage_base_url,
        };

        let client = ClientConfig {
            feed_limit: parse_var("SPHERE_FEED_LIMIT")?.unwrap_or_else(default_feed_limit),
            search_debounce_ms: parse_var("SPHERE_SEARCH_DEBOUNCE_MS")?
                .unwrap_or_else(default_search_debounce_ms),
            search_initial_results: parse_var("SPHERE_SEARCH_INITIAL_RESULTS")?
                .unwrap_or_else(default_search_initial_results),
        };
        if client.feed_limit == 0 {
            anyhow::bail!("SPHERE_FEED_LIMIT must be greater than zero");
        }

        let demo = DemoAccountConfig {
            email: std::env::var("SPHERE_DEMO_EMAIL")
                .unwrap_or_else(|_| "demo@connectsphere.local".to_string()),
            password: std::env::var("SPHERE_DEMO_PASSWORD")
                .unwrap_or_else(|_| "connectsphere-demo".to_string()),
            display_name: std::env::var("SPHERE_DEMO_NAME")
                .unwrap_or_else(|_| "Demo User".to_string()),
        };

        Ok(Config {
            app,
            backend,
            client,
            demo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "APP_ENV",
        "SPHERE_PROJECT_ID",
        "SPHERE_STORAGE_BUCKET",
        "SPHERE_STORAGE_BASE_URL",
        "SPHERE_FEED_LIMIT",
        "SPHERE_SEARCH_DEBOUNCE_MS",
        "SPHERE_SEARCH_INITIAL_RESULTS",
        "SPHERE_DEMO_EMAIL",
        "SPHERE_DEMO_PASSWORD",
        "SPHERE_DEMO_NAME",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_default_values() {
        clear_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.backend.project_id, "connectsphere-local");
        assert_eq!(config.backend.storage_bucket, "connectsphere-local.appspot.com");
        assert_eq!(
            config.backend.storage_base_url,
            "https://storage.local/v0/b/connectsphere-local.appspot.com"
        );
        assert_eq!(config.client.feed_limit, 20);
        assert_eq!(config.client.search_debounce(), Duration::from_millis(300));
        assert_eq!(config.client.search_initial_results, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("SPHERE_PROJECT_ID", "sphere-test");
        std::env::set_var("SPHERE_FEED_LIMIT", "5");

        let config = Config::from_env().unwrap();
        assert_eq!(config.backend.storage_bucket, "sphere-test.appspot.com");
        assert_eq!(config.client.feed_limit, 5);

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_number_is_rejected() {
        clear_env();
        std::env::set_var("SPHERE_FEED_LIMIT", "twenty");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("SPHERE_FEED_LIMIT"));

        clear_env();
    }
}
