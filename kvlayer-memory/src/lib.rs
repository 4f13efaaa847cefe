//! In-memory structured store backend for kvlayer.
//!
//! This crate implements the kvlayer operation contract over an in-process copy of
//! the `objects`/`search` row schema. It uses an async-aware read-write lock for
//! concurrent access and is meant for development, testing and single-process
//! deployments.
//!
//! # Features
//!
//! - **Same row schema** - Rows are [`ObjectRow`](kvlayer_core::schema::ObjectRow) values grouped by key
//! - **Same ordering** - Score and list order break ties by insertion, like the document store
//! - **Expiry** - Expired rows vanish from reads immediately and are purged by a TTL monitor
//! - **Sessions** - An in-process session store and a stand-in cache for the cache adapter
//!
//! # Quick Start
//!
//! ```ignore
//! use kvlayer_core::{config::Settings, ops::HashOps};
//! use kvlayer_memory::initialize;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connected = initialize(&Settings::default(), None).await?;
//!     let store = connected.store();
//!
//!     store.set_object_field("user:1", "username", "alice".into()).await?;
//!     assert!(store.is_object_field("user:1", "username").await?);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as kvlayer_memory;

pub mod bootstrap;
pub mod hash;
pub mod keys;
pub mod list;
pub mod session;
pub mod sets;
pub mod sorted;
pub mod store;
pub mod table;

pub use bootstrap::{MemoryConnected, initialize};
pub use session::{InMemoryCache, InMemoryCacheConnector, InMemorySessionStore};
pub use store::{InMemoryStore, InMemoryStoreBuilder, MemoryDatabase};
