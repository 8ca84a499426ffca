//! Identifier hashing and the MDQ metadata resolver.
//!
//! MDQ lookups are addressed by a content hash of the raw entity
//! identifier: the literal tag `{sha1}` followed by the lowercase hex
//! SHA-1 digest. The tag is part of the server's addressing convention
//! and is preserved exactly.

use crate::models::Entity;
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Result type for resolver lookups.
pub type MdqResult<T> = Result<T, MdqError>;

/// Request timeout applied to every MDQ lookup.
const MDQ_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolver failure for a single lookup.
///
/// Every variant is soft: the list manager logs it and keeps whatever it
/// already had for the affected item.
#[derive(Debug, Error)]
pub enum MdqError {
    /// The server has no entity under the hashed identifier (HTTP 404).
    #[error("entity not found in MDQ server")]
    NotFound,

    /// The server answered with something other than a JSON entity
    /// descriptor.
    #[error("MDQ response was not JSON: {0}")]
    BadFormat(String),

    /// Unexpected HTTP status.
    #[error("MDQ request failed with HTTP {0}")]
    Status(u16),

    /// Transport-level failure.
    #[error("MDQ request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Hash a raw entity identifier into the MDQ addressing form:
/// `{sha1}` + lowercase hex digest.
#[must_use]
pub fn sha1_id(raw: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(raw.as_bytes());
    format!("{{sha1}}{}", hex::encode(hasher.finalize()))
}

/// Async lookup of entity metadata by hashed identifier.
///
/// Implement this to substitute your own resolver; [`MdqClient`] is the
/// built-in HTTP-backed implementation.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve a hashed identifier (see [`sha1_id`]) to its current
    /// entity descriptor.
    async fn lookup(&self, hashed_id: &str) -> MdqResult<Entity>;
}

/// HTTP-backed MDQ resolver: `GET <base_url><hashed_id>.json`.
///
/// The base URL is used as a raw prefix, so a trailing slash (or any
/// other path prefix the server indexes under) belongs to the
/// configuration value.
#[derive(Debug, Clone)]
pub struct MdqClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl MdqClient {
    /// Create a resolver for the given MDQ base URL.
    pub fn new(base_url: impl Into<String>) -> MdqResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(MDQ_TIMEOUT)
            .user_agent(concat!("ds-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_http_client(base_url, http_client))
    }

    /// Create a resolver with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl MetadataResolver for MdqClient {
    async fn lookup(&self, hashed_id: &str) -> MdqResult<Entity> {
        let url = format!("{}{}.json", self.base_url, hashed_id);
        debug!("MDQ GET {}", url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MdqError::NotFound);
        }
        if !status.is_success() {
            return Err(MdqError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("application/json") {
            return Err(MdqError::BadFormat(format!(
                "unexpected content type: {content_type:?}"
            )));
        }

        let body = response.text().await?;
        let data: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| MdqError::BadFormat(format!("undecodable body: {e}")))?;

        // Some MDQ deployments answer with a one-element array.
        let data = match data {
            serde_json::Value::Array(values) => {
                values.into_iter().next().ok_or(MdqError::NotFound)?
            }
            other => other,
        };

        serde_json::from_value(data)
            .map_err(|e| MdqError::BadFormat(format!("undecodable entity descriptor: {e}")))
    }
}
