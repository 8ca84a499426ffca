//! Error types for discovery operations.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Crate-level error for discovery operations.
///
/// Store failures are fatal to the operation that hit them. Resolver
/// failures never reach this type: the list manager recovers them per item
/// and keeps the stale record (see [`crate::mdq::MdqError`]).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The service was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key-value store failure (connect, read, or write).
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The outgoing choice list could not be serialized.
    #[error("failed to serialize discovery choices: {0}")]
    Serialize(#[from] serde_json::Error),
}
