//! MongoDB backend implementation for kvlayer.
//!
//! This crate emulates the kvlayer structures over two MongoDB collections,
//! `objects` and `search`, one row per (key, member) pair.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! kvlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Pooled connection** - One shared client, sized by the `pool_size` setting
//! - **Fixed indices** - Declared in the background once the connection is authenticated
//! - **Sessions** - A `sessions` collection adapter, or the external cache when configured
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//!
//! # Example
//!
//! ```ignore
//! use kvlayer_core::{config::Settings, ops::SortedSetOps};
//! use kvlayer_mongodb::initialize;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connected = initialize(&Settings::load()?, None).await?;
//!
//!     // Wait for the indices before the first ranked read.
//!     if let Some(indices) = connected.indices() {
//!         indices.wait().await;
//!     }
//!
//!     connected.store().sorted_set_add("users:joindate", 1.0, "1").await?;
//!     connected.close().await;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as kvlayer_mongodb;

pub mod bootstrap;
pub mod connection;
pub mod filters;
pub mod hash;
pub mod keys;
pub mod list;
pub mod session;
pub mod sets;
pub mod sorted;

mod error;

pub use bootstrap::{Connected, MongoDatabase, compose, initialize};
pub use connection::MongoConnection;
pub use session::MongoSessionStore;
