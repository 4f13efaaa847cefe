//! Main kvlayer crate providing one structured key-value interface over several
//! storage backends.
//!
//! This crate is the primary entry point for users of kvlayer. It re-exports the
//! core types and functionality from the sub-crates and provides access to the
//! backends.
//!
//! # Features
//!
//! - **Redis-style structures** - Plain values, hashes, sets, sorted sets and lists
//! - **Multiple backends** - In-memory and MongoDB behind the same traits
//! - **Explicit absence** - Single-item reads tell a missing key from a missing member
//! - **Sessions** - A session store chosen once from the settings
//!
//! # Quick Start
//!
//! ```ignore
//! use kvlayer::{prelude::*, memory};
//!
//! #[tokio::main]
//! async fn main() -> KvStoreResult<()> {
//!     let connected = memory::initialize(&Settings::default(), None).await?;
//!     let store = connected.store();
//!
//!     store.sorted_set_add("users:joindate", 3.0, "c").await?;
//!     store.sorted_set_add("users:joindate", 1.0, "a").await?;
//!     store.sorted_set_add("users:joindate", 2.0, "b").await?;
//!
//!     assert_eq!(store.get_sorted_set_range("users:joindate", 0, -1).await?, ["a", "b", "c"]);
//!     assert_eq!(store.sorted_set_rank("users:joindate", "z").await?, Lookup::MemberAbsent);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Every operation trait is object safe, so code can take `&dyn StructuredStore`
//! and stay independent of the backend chosen at startup.
//!
//! ```ignore
//! use kvlayer::prelude::*;
//!
//! async fn count_posts(store: &dyn StructuredStore, uid: &str) -> KvStoreResult<i64> {
//!     store.increment_object_field(&format!("user:{}", uid), "postcount").await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use kvlayer_core::{config, database, error, index, ops, range, schema, session};

// Re-export BSON types for convenience
pub use bson;

// Needed to implement the cache traits
pub use async_trait::async_trait;

/// In-memory storage backend.
pub mod memory {
    pub use kvlayer_memory::{
        InMemoryCache, InMemoryCacheConnector, InMemorySessionStore, InMemoryStore,
        InMemoryStoreBuilder, MemoryConnected, MemoryDatabase, initialize,
    };
}

/// MongoDB storage backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use kvlayer_mongodb::{
        Connected, MongoConnection, MongoDatabase, MongoSessionStore, compose, initialize,
    };
}
