//! A structured key-value layer over document databases.
//!
//! This crate is the core of the kvlayer project and provides:
//!
//! - **Row schema** ([`schema`]) - The `objects` and `search` row layouts shared by every backend
//! - **Operation contract** ([`ops`]) - One trait per structure kind plus the [`ops::StructuredStore`] union
//! - **Composition** ([`database`]) - [`database::Database`], one module per kind behind one store
//! - **Index provisioning** ([`index`]) - The five fixed indices and their background declaration
//! - **Sessions** ([`session`]) - The session store contract and the one-time adapter selection
//! - **Settings** ([`config`]) - Layered configuration for the store and the optional cache
//! - **Ranges** ([`range`]) - Index and score range helpers
//! - **Error handling** ([`error`]) - Error kinds and result types
//!
//! # Example
//!
//! ```ignore
//! use kvlayer_core::ops::{SetOps, Membership};
//!
//! async fn check(store: &impl SetOps) {
//!     store.set_add("tags", &["rust", "mongodb"]).await.unwrap();
//!
//!     assert_eq!(store.is_set_member("tags", "rust").await.unwrap(), Membership::Member);
//!     assert_eq!(store.is_set_member("tags", "go").await.unwrap(), Membership::NotMember);
//!     assert_eq!(store.is_set_member("missing", "go").await.unwrap(), Membership::KeyAbsent);
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as kvlayer_core;

pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod ops;
pub mod range;
pub mod schema;
pub mod session;
