//! Storage abstractions for catalog persistence.
//!
//! The catalog is a single JSON document:
//!
//! ```text
//! rom_cache.json
//! {
//!   "version": 1,
//!   "snapshots": { "<source id>": { "fingerprint": ..., "entries": [...] } },
//!   "failures":  { "<source id>": { "kind": "unreachable", ... } }
//! }
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Catalog;

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for catalog storage backends.
#[async_trait]
pub trait CatalogStorage: Send + Sync {
    /// Load the stored catalog; `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<Catalog>>;

    /// Replace the stored catalog. Either the whole catalog is written or the
    /// previous one stays untouched.
    async fn save(&self, catalog: &Catalog) -> Result<()>;
}
