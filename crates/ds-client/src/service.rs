//! Discovery protocol responder.
//!
//! Records identity-provider choices through the list manager and builds
//! the redirect that hands the chosen entity id back to the relying
//! party. The host page supplies the request parameters explicitly; the
//! responder reads no process-wide state.

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::list::{DiscoveryList, FRESHNESS_WINDOW};
use crate::mdq::{sha1_id, MdqClient, MetadataResolver};
use crate::models::{now_millis, touch, DiscoveryItem};
use crate::store::{ChoiceStore, StoreConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Name of the redirect query parameter carrying the chosen entity id
/// when the relying party does not specify one.
pub const DEFAULT_RETURN_ID_PARAM: &str = "entityID";

/// Flat request-parameter mapping supplied by the host page.
///
/// Relevant keys: `return` (redirect base URL) and `returnIDParam`
/// (name of the id parameter). Empty values read as absent.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    params: HashMap<String, String>,
}

impl RequestParams {
    /// Empty parameter set (what [`DiscoveryService::pin`] uses).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string into a flat key/value mapping.
    ///
    /// A leading `?` is tolerated. Segments without `=` are skipped; `+`
    /// reads as space and values are percent-decoded.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = HashMap::new();
        for segment in query.split('&') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let value = value.replace('+', " ");
            let decoded = urlencoding::decode(&value).map(|v| v.into_owned()).ok();
            params.insert(key.to_string(), decoded.unwrap_or(value));
        }
        Self { params }
    }

    /// Insert or replace a parameter, for host pages that already parsed
    /// their query string.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Value for `key`, treating an empty string as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Redirect base URL supplied by the relying party.
    #[must_use]
    pub fn return_url(&self) -> Option<&str> {
        self.get("return")
    }

    /// Name of the id parameter to append to the redirect.
    #[must_use]
    pub fn return_id_param(&self) -> &str {
        self.get("returnIDParam").unwrap_or(DEFAULT_RETURN_ID_PARAM)
    }
}

/// Construction-time configuration for [`DiscoveryService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// MDQ base URL; hashed identifiers are appended to it as-is.
    pub mdq_url: String,

    /// Store selector: the `local://` marker or a remote store URL.
    pub storage_url: String,

    /// Freshness window for cached metadata, in seconds.
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
}

fn default_freshness_secs() -> u64 {
    FRESHNESS_WINDOW.as_secs()
}

/// The discovery protocol responder.
///
/// Orchestrates "record a choice" and "build the redirect" over the list
/// manager. Holds no list state of its own; concurrent callers race on
/// the store with last-writer-wins semantics, so hosts are expected to
/// serialize discovery operations.
#[derive(Clone)]
pub struct DiscoveryService {
    list: DiscoveryList,
    resolver: Arc<dyn MetadataResolver>,
}

impl DiscoveryService {
    /// Build a service from configuration: the built-in MDQ resolver plus
    /// whichever store the storage URL selects.
    pub fn new(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let resolver: Arc<dyn MetadataResolver> = Arc::new(
            MdqClient::new(config.mdq_url.clone())
                .map_err(|e| DiscoveryError::InvalidConfig(e.to_string()))?,
        );
        let store = StoreConfig::parse(&config.storage_url)?.build()?;
        let list = DiscoveryList::with_freshness_window(
            store,
            resolver.clone(),
            Duration::from_secs(config.freshness_secs),
        );
        Ok(Self { list, resolver })
    }

    /// Build a service from explicit collaborators, for embedders with
    /// their own store or resolver and for tests.
    #[must_use]
    pub fn with_components(
        store: Arc<dyn ChoiceStore>,
        resolver: Arc<dyn MetadataResolver>,
    ) -> Self {
        let list = DiscoveryList::new(store, resolver.clone());
        Self { list, resolver }
    }

    /// Record a choice and build the discovery response redirect.
    ///
    /// Returns the redirect URL when the request carries a `return`
    /// parameter and `None` otherwise; the caller decides what `None`
    /// means.
    pub async fn respond(
        &self,
        entity_id: &str,
        params: &RequestParams,
    ) -> DiscoveryResult<Option<String>> {
        self.record_choice(entity_id).await?;

        let Some(return_url) = params.return_url() else {
            return Ok(None);
        };
        let response = build_redirect(return_url, params.return_id_param(), entity_id);
        info!(entity_id = %entity_id, redirect = %response, "returning discovery response");
        Ok(Some(response))
    }

    /// Record a choice without producing a redirect.
    pub async fn pin(&self, entity_id: &str) -> DiscoveryResult<()> {
        self.respond(entity_id, &RequestParams::new())
            .await
            .map(|_| ())
    }

    /// Forget every stored choice matching `entity_id` under either
    /// naming convention. Unknown ids are a no-op.
    pub async fn remove(&self, entity_id: &str) -> DiscoveryResult<()> {
        let id = entity_id.to_string();
        self.list
            .with_items(move |items| async move {
                Ok(items
                    .into_iter()
                    .filter(|item| !item.entity.as_ref().is_some_and(|e| e.matches_id(&id)))
                    .collect())
            })
            .await
    }

    /// Touch the existing record for `entity_id`, or resolve and append a
    /// new one. The append happens inside the transform, so the list may
    /// transiently exceed capacity until the next load re-applies it.
    async fn record_choice(&self, entity_id: &str) -> DiscoveryResult<()> {
        let resolver = self.resolver.clone();
        let id = entity_id.to_string();
        self.list
            .with_items(move |mut items| async move {
                if touch(&id, &mut items).is_some() {
                    return Ok(items);
                }

                let entity = match resolver.lookup(&sha1_id(&id)).await {
                    Ok(mut entity) => {
                        debug!(entity_id = %id, "MDQ found entity for new choice");
                        entity.normalize();
                        Some(entity)
                    }
                    Err(e) => {
                        // The choice is still recorded without metadata.
                        warn!(entity_id = %id, error = %e, "MDQ lookup failed for new choice");
                        None
                    }
                };
                items.push(DiscoveryItem::new_choice(entity, now_millis()));
                Ok(items)
            })
            .await
    }
}

/// Append the chosen entity id to the relying party's return URL.
///
/// Uses `?` or `&` depending on whether the URL already carries a query
/// string. An empty entity id leaves the URL untouched.
fn build_redirect(return_url: &str, id_param: &str, entity_id: &str) -> String {
    if entity_id.is_empty() {
        return return_url.to_string();
    }
    let separator = if return_url.contains('?') { '&' } else { '?' };
    format!("{return_url}{separator}{id_param}={entity_id}")
}
