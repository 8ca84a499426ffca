//! Client-side SAML discovery helper.
//!
//! Implements the "remember my identity provider" half of a federated-login
//! discovery workflow: a small, bounded, persisted list of the
//! identity-provider choices a user has made, kept fresh against an MDQ
//! metadata service, plus the redirect that hands the chosen entity id back
//! to the relying party.
//!
//! # Modules
//!
//! - [`models`] - entity descriptors and cache records
//! - [`store`] - pluggable key-value store (in-process shim or remote service)
//! - [`mdq`] - identifier hashing and the MDQ metadata resolver
//! - [`list`] - the discovery list manager
//! - [`service`] - the discovery protocol responder
//! - [`error`] - crate-level error types

pub mod error;
pub mod list;
pub mod mdq;
pub mod models;
pub mod service;
pub mod store;

pub use error::{DiscoveryError, DiscoveryResult};
pub use list::DiscoveryList;
pub use mdq::{MdqClient, MdqError, MetadataResolver};
pub use models::{touch, DiscoveryItem, Entity};
pub use service::{DiscoveryConfig, DiscoveryService, RequestParams};
pub use store::{ChoiceStore, HttpStore, MemoryStore, StoreConfig, StoreError};
