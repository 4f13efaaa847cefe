//! Error types and result types for structured key-value operations.
//!
//! This module provides error handling for the whole lifecycle of a store: startup
//! (configuration, connection, authentication), background index provisioning and
//! the structure operations themselves. Use [`KvStoreResult<T>`] as the return type
//! for fallible operations.

use bson::error::Error as BsonError;
use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a structured store.
///
/// The startup kinds ([`Configuration`](KvStoreError::Configuration),
/// [`Connection`](KvStoreError::Connection) and
/// [`Authentication`](KvStoreError::Authentication)) abort initialization. Index
/// provisioning failures are logged and never abort anything. Operation failures
/// are handed to the immediate caller unmodified.
#[derive(Error, Debug)]
pub enum KvStoreError {
    /// Settings or driver options are unusable, so startup cannot begin.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Network or handshake failure while reaching the document store.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Credentials were configured but the store rejected them.
    ///
    /// This kind is fatal: the top-level caller must abort startup rather than
    /// continue with an unauthenticated handle.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// A single index declaration failed.
    #[error("Failed to create index {keys} on {collection}: {reason}")]
    IndexProvisioning {
        /// The collection the index was declared on.
        collection: String,
        /// The index key specification, rendered as extended JSON.
        keys: String,
        /// The failure reported by the store.
        reason: String,
    },
    /// Any store error surfaced while running a structure operation.
    #[error("Operation error: {0}")]
    Operation(String),
    /// A driver-level timeout. The underlying write may still complete.
    #[error("Operation timed out: {0}")]
    Timeout(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A stored value cannot be used for the requested operation.
    /// The first argument is the key, the second describes the problem.
    #[error("Invalid value at {0}: {1}")]
    InvalidValue(String, String),
}

impl KvStoreError {
    /// Returns `true` for errors the top-level caller must treat as unrecoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KvStoreError::Authentication(_))
    }

    /// Returns `true` when the error aborted startup.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            KvStoreError::Configuration(_) | KvStoreError::Connection(_) | KvStoreError::Authentication(_)
        )
    }
}

/// A specialized `Result` type for structured store operations.
pub type KvStoreResult<T> = Result<T, KvStoreError>;

impl From<BsonError> for KvStoreError {
    fn from(err: BsonError) -> Self {
        KvStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for KvStoreError {
    fn from(err: SerdeJsonError) -> Self {
        KvStoreError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for KvStoreError {
    fn from(err: ConfigError) -> Self {
        KvStoreError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authentication_is_fatal() {
        assert!(KvStoreError::Authentication("bad credentials".into()).is_fatal());
        assert!(!KvStoreError::Connection("refused".into()).is_fatal());
        assert!(!KvStoreError::Operation("boom".into()).is_fatal());
    }

    #[test]
    fn index_errors_are_not_startup_errors() {
        let err = KvStoreError::IndexProvisioning {
            collection: "objects".into(),
            keys: "{\"expireAt\":1}".into(),
            reason: "exists with different options".into(),
        };

        assert!(!err.is_startup());
        assert_eq!(
            err.to_string(),
            "Failed to create index {\"expireAt\":1} on objects: exists with different options"
        );
    }
}
