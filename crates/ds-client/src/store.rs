//! Pluggable key-value store for persisted discovery choices.
//!
//! Two interchangeable deployments exist: an in-process map standing in
//! for same-origin page storage, and a remote cross-origin store reached
//! over HTTP. Which one a service uses is decided once, at construction,
//! from a configuration value: the `local://` marker or a store URL.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Marker value selecting the in-process store.
pub const LOCAL_STORE_URL: &str = "local://";

/// Request timeout applied to every remote store call.
const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Store failure. Every variant is fatal to the discovery operation that
/// hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("store connect failed: {0}")]
    Connect(String),

    #[error("store read failed: {0}")]
    Read(String),

    #[error("store write failed: {0}")]
    Write(String),
}

/// Async key-value store over string values.
#[async_trait]
pub trait ChoiceStore: Send + Sync {
    /// Establish the connection. Called before every load-transform-store
    /// cycle; implementations may treat repeat calls as a no-op.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Read the value for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value for `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Store deployment, resolved once from a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// In-process storage (the `local://` marker).
    Local,
    /// Remote cross-origin store at the given base URL.
    Remote(String),
}

impl StoreConfig {
    /// Parse a configuration value: the `local://` marker or a store URL.
    pub fn parse(value: &str) -> Result<Self, StoreError> {
        if value == LOCAL_STORE_URL {
            return Ok(Self::Local);
        }

        let parsed = url::Url::parse(value)
            .map_err(|e| StoreError::InvalidConfig(format!("invalid store URL {value}: {e}")))?;
        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(StoreError::InvalidConfig(format!(
                "unsupported store URL scheme: {scheme}"
            )));
        }

        Ok(Self::Remote(
            parsed.as_str().trim_end_matches('/').to_string(),
        ))
    }

    /// Build the store this configuration selects.
    pub fn build(&self) -> Result<Arc<dyn ChoiceStore>, StoreError> {
        match self {
            Self::Local => Ok(Arc::new(MemoryStore::new())),
            Self::Remote(base_url) => Ok(Arc::new(HttpStore::new(base_url.clone())?)),
        }
    }
}

/// In-process store. Clones share the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChoiceStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Remote key-value store reached over HTTP.
///
/// `get` is `GET <base>/<key>` (a 404 reads as absent), `set` is
/// `PUT <base>/<key>` with the raw value as the body. `connect` performs a
/// liveness request against the base URL; any response counts as
/// connected, only transport failures do not.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpStore {
    /// Create a store for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(STORE_TIMEOUT)
            .user_agent(concat!("ds-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(base_url, http_client))
    }

    /// Create a store with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
        }
    }

    fn key_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(key))
    }
}

#[async_trait]
impl ChoiceStore for HttpStore {
    async fn connect(&self) -> Result<(), StoreError> {
        debug!(base_url = %self.base_url, "connecting to remote choice store");
        self.http_client
            .get(&self.base_url)
            .send()
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let url = self.key_url(key);
        debug!("store GET {}", url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Read(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(Some(body))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = self.key_url(key);
        debug!("store PUT {}", url);
        let response = self
            .http_client
            .put(&url)
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Write(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_local_marker() {
        assert_eq!(StoreConfig::parse("local://").unwrap(), StoreConfig::Local);
    }

    #[test]
    fn parse_remote_url_trims_trailing_slash() {
        let config = StoreConfig::parse("https://store.example.org/choices/").unwrap();
        assert_eq!(
            config,
            StoreConfig::Remote("https://store.example.org/choices".to_string())
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            StoreConfig::parse("not a url"),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn parse_rejects_unsupported_scheme() {
        assert!(matches!(
            StoreConfig::parse("ftp://store.example.org"),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("key", "value").await.unwrap();
        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("value"));

        store.set("key", "overwritten").await.unwrap();
        assert_eq!(
            store.get("key").await.unwrap().as_deref(),
            Some("overwritten")
        );
    }

    #[tokio::test]
    async fn memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let clone = store.clone();

        store.set("key", "value").await.unwrap();
        assert_eq!(clone.get("key").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn http_store_get_absent_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/choices"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpStore::new(server.uri()).unwrap();
        assert_eq!(store.get("choices").await.unwrap(), None);
    }

    #[tokio::test]
    async fn http_store_get_and_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/choices"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/choices"))
            .and(body_string("[1]"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpStore::new(server.uri()).unwrap();
        assert_eq!(store.get("choices").await.unwrap().as_deref(), Some("[]"));
        store.set("choices", "[1]").await.unwrap();
    }

    #[tokio::test]
    async fn http_store_surfaces_write_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/choices"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = HttpStore::new(server.uri()).unwrap();
        assert!(matches!(
            store.set("choices", "[]").await,
            Err(StoreError::Write(_))
        ));
    }
}
