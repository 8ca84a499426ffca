//! Entity descriptors and cache records for the discovery list.
//!
//! Entities arrive under two historical field-naming conventions
//! (`entity_id`/`entityID` and `entity_icon`/`icon`). Normalization
//! reconciles them into the canonical shape without stripping the legacy
//! fields from the wire, so older readers of the persisted list keep
//! working.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata descriptor for an identity provider.
///
/// Resolver-supplied fields beyond the known set pass through unmodified
/// in [`Entity::extra`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical unique identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Legacy spelling of the identifier.
    #[serde(rename = "entityID", default, skip_serializing_if = "Option::is_none")]
    pub legacy_entity_id: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Canonical icon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_icon: Option<String>,

    /// Legacy spelling of the icon URL.
    #[serde(rename = "icon", default, skip_serializing_if = "Option::is_none")]
    pub legacy_icon: Option<String>,

    /// Opaque resolver-supplied fields, carried as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    /// The identifier under either naming convention, canonical first.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.entity_id
            .as_deref()
            .or(self.legacy_entity_id.as_deref())
    }

    /// Whether this entity carries `entity_id` under either naming
    /// convention.
    #[must_use]
    pub fn matches_id(&self, entity_id: &str) -> bool {
        self.entity_id.as_deref() == Some(entity_id)
            || self.legacy_entity_id.as_deref() == Some(entity_id)
    }

    /// Reconcile legacy field names into the canonical shape.
    ///
    /// Only acts when an identifier (under either convention) and a title
    /// are present; otherwise the entity is left untouched. Idempotent.
    pub fn normalize(&mut self) {
        if (self.entity_id.is_some() || self.legacy_entity_id.is_some()) && self.title.is_some() {
            if self.entity_id.is_none() {
                self.entity_id = self.legacy_entity_id.clone();
            }
            if self.entity_icon.is_none() {
                self.entity_icon = self.legacy_icon.clone();
            }
        }
    }
}

/// One record in the persisted discovery list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryItem {
    /// The cached entity. Absent when a choice was recorded while the
    /// resolver had nothing for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,

    /// Times this entity was chosen.
    #[serde(default)]
    pub use_count: u32,

    /// Timestamp (ms since epoch) of the most recent choice.
    #[serde(default)]
    pub last_use: i64,

    /// Timestamp of the most recent successful metadata refresh. Absent
    /// when the entity was never refreshed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<i64>,
}

impl DiscoveryItem {
    /// The record for a freshly made choice.
    #[must_use]
    pub fn new_choice(entity: Option<Entity>, now: i64) -> Self {
        Self {
            entity,
            use_count: 1,
            last_use: now,
            last_refresh: Some(now),
        }
    }

    /// Normalize the wrapped entity. No-op when absent.
    pub fn normalize(&mut self) {
        if let Some(entity) = self.entity.as_mut() {
            entity.normalize();
        }
    }

    /// The wrapped entity's identifier, if any.
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        self.entity.as_ref().and_then(Entity::id)
    }

    /// Whether the last successful refresh is older than `window_ms`, or
    /// never happened.
    #[must_use]
    pub fn is_stale(&self, now: i64, window_ms: i64) -> bool {
        match self.last_refresh {
            Some(at) => at + window_ms < now,
            None => true,
        }
    }
}

/// Current wall-clock time in milliseconds since the epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Record a use of `entity_id` against an in-memory list.
///
/// Increments the matching item's `use_count`, stamps `last_use`, and
/// returns the count as it was before the increment. Returns `None` and
/// leaves the list untouched when no item matches under either naming
/// convention, which is the signal that the choice is brand new.
pub fn touch(entity_id: &str, items: &mut [DiscoveryItem]) -> Option<u32> {
    for item in items.iter_mut() {
        if item
            .entity
            .as_ref()
            .is_some_and(|e| e.matches_id(entity_id))
        {
            let previous = item.use_count;
            item.use_count += 1;
            item.last_use = now_millis();
            return Some(previous);
        }
    }
    None
}
