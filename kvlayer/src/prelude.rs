//! Convenient re-exports of commonly used types from kvlayer.
//!
//! ```ignore
//! use kvlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The operation traits and their result types
//! - The composed store and the settings
//! - Session store types
//! - Error types

pub use kvlayer_core::{
    config::{MongoSettings, RedisSettings, Settings},
    database::Database,
    error::{KvStoreError, KvStoreResult},
    index::{IndexProvisioning, ProvisioningReport},
    ops::{HashOps, KeyValueOps, ListOps, Lookup, Membership, ScoredMember, SetOps, SortedSetOps, StructuredStore},
    range::ScoreRange,
    schema::StructureKind,
    session::{CacheClient, CacheConnector, SelectedSessionStore, SessionStore},
};
