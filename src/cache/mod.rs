//! Offline response cache.
//!
//! This module provides the read side of offline support:
//! - Two named partitions per cache version (static app shell, dynamic API responses)
//! - Network-first reads for API endpoints with cache and default fallbacks
//! - Cache-first reads for static assets
//! - Eviction of partitions left behind by older versions

mod defaults;
mod layer;
mod storage;
mod traits;

pub use layer::CacheManager;
pub use storage::{NoopStorage, ResponseStore, SqliteStorage};
pub use traits::{CachedResponse, Partitions, ServeSource, Served};
