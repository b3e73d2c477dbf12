//! Generational response cache for offline-available assets.
//!
//! This module is the cache manager core:
//! - Response snapshots stored under normalized resource identifiers
//! - Generations: versioned, internally consistent sets of snapshots
//! - A lifecycle controller driving install, activation, and interception
//! - The cache-first resolution policy with offline navigation fallback

mod lifecycle;
mod policy;
mod store;
mod types;

pub use lifecycle::{LifecycleController, Phase};
pub use policy::FetchPolicy;
pub use store::{GenerationInfo, GenerationStore, SqliteStore};
pub use types::{
  Destination, GenerationLabel, Request, Resolved, ResourceId, ServedFrom, Snapshot,
};
