//! Discovery list manager.
//!
//! Owns the cached list's invariants: unique by entity id, at most three
//! records, ascending by recency, metadata no older than the freshness
//! window. The persisted store is the single source of truth: every
//! mutation is one load-transform-store cycle and the manager keeps no
//! list state of its own between calls.

use crate::error::DiscoveryResult;
use crate::mdq::{sha1_id, MetadataResolver};
use crate::models::{now_millis, DiscoveryItem};
use crate::store::ChoiceStore;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Storage key holding the serialized discovery list.
pub const STORAGE_KEY: &str = "discovery_choices";

/// How many choices the list retains.
pub const MAX_ITEMS: usize = 3;

/// How long a refreshed entity stays fresh.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(600);

/// The discovery list manager.
#[derive(Clone)]
pub struct DiscoveryList {
    store: Arc<dyn ChoiceStore>,
    resolver: Arc<dyn MetadataResolver>,
    freshness_window: Duration,
}

impl DiscoveryList {
    /// Create a manager with the default freshness window.
    #[must_use]
    pub fn new(store: Arc<dyn ChoiceStore>, resolver: Arc<dyn MetadataResolver>) -> Self {
        Self::with_freshness_window(store, resolver, FRESHNESS_WINDOW)
    }

    /// Create a manager with a custom freshness window.
    #[must_use]
    pub fn with_freshness_window(
        store: Arc<dyn ChoiceStore>,
        resolver: Arc<dyn MetadataResolver>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            freshness_window,
        }
    }

    /// Load, repair, refresh, transform, and persist the list.
    ///
    /// The single choke point for every mutation: the list is read fresh
    /// from the store, its invariants are re-established, stale entries
    /// are refreshed, `transform` is applied, and the result is written
    /// back in one overwrite (last writer wins). Store failures abort the
    /// whole operation; per-item resolver failures do not.
    pub async fn with_items<F, Fut>(&self, transform: F) -> DiscoveryResult<()>
    where
        F: FnOnce(Vec<DiscoveryItem>) -> Fut,
        Fut: Future<Output = DiscoveryResult<Vec<DiscoveryItem>>>,
    {
        self.store.connect().await?;
        debug!("listing discovery choices");
        let raw = self.store.get(STORAGE_KEY).await?;

        let items = parse_items(raw.as_deref());
        let items = rebuild(items);
        let items = self.refresh_stale(items).await;
        let items = transform(items).await?;

        let payload = serde_json::to_string(&items)?;
        self.store.set(STORAGE_KEY, &payload).await?;
        Ok(())
    }

    /// Refresh every stale entity, concurrently and independently: one
    /// item's resolver latency or failure never blocks or corrupts
    /// another's result.
    async fn refresh_stale(&self, items: Vec<DiscoveryItem>) -> Vec<DiscoveryItem> {
        join_all(items.into_iter().map(|item| self.refresh_item(item))).await
    }

    async fn refresh_item(&self, mut item: DiscoveryItem) -> DiscoveryItem {
        let now = now_millis();
        let window_ms = self.freshness_window.as_millis() as i64;
        if !item.is_stale(now, window_ms) {
            return item;
        }
        let Some(id) = item.entity_id().map(str::to_string) else {
            return item;
        };

        match self.resolver.lookup(&sha1_id(&id)).await {
            Ok(entity) => {
                item.entity = Some(entity);
                item.normalize();
                item.last_refresh = Some(now);
            }
            Err(e) => {
                warn!(entity_id = %id, error = %e, "metadata refresh failed, keeping cached entity");
            }
        }
        item
    }
}

/// Decode the persisted blob. Absent or malformed data reads as an empty
/// list, never as an error.
fn parse_items(raw: Option<&str>) -> Vec<DiscoveryItem> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "malformed discovery choices, starting from an empty list");
            Vec::new()
        }
    }
}

/// Re-establish the list invariants on freshly loaded items: normalize,
/// dedup by entity id (a later duplicate replaces the earlier value but
/// keeps its first-seen position), truncate to capacity, then sort by
/// recency.
///
/// Capacity is enforced before the sort, so an oversized persisted blob
/// loses its tail in dedup order, not its least recently used entries.
fn rebuild(items: Vec<DiscoveryItem>) -> Vec<DiscoveryItem> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, DiscoveryItem> = HashMap::new();

    for mut item in items {
        item.normalize();
        let Some(id) = item.entity_id().map(str::to_string) else {
            warn!("dropping stored choice without an entity id");
            continue;
        };
        if !by_id.contains_key(&id) {
            order.push(id.clone());
        }
        by_id.insert(id, item);
    }

    let mut list: Vec<DiscoveryItem> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();

    list.truncate(MAX_ITEMS);
    // Stable sort: ties keep their order, most recently used ends last.
    list.sort_by_key(|item| item.last_use);
    list
}
