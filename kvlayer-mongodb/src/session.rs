//! Document-store session adapter.
//!
//! Sessions live in the `sessions` collection as
//! `{ _id: <session id>, session: <JSON text>, expires: <date>, ttl: <millis> }`.
//! Expired sessions are ignored on read.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bson::{DateTime, Document, doc};
use chrono::{TimeDelta, Utc};
use serde_json::Value;

use kvlayer_core::{
    error::{KvStoreError, KvStoreResult},
    session::{DEFAULT_SESSION_TTL, SessionStore},
};

use crate::{connection::MongoConnection, error::operation_error};

/// Collection holding sessions.
pub const SESSIONS: &str = "sessions";

#[derive(Debug, Clone)]
pub struct MongoSessionStore {
    conn: Arc<MongoConnection>,
    ttl: Duration,
}

impl MongoSessionStore {
    pub fn new(conn: Arc<MongoConnection>) -> Self {
        Self { conn, ttl: DEFAULT_SESSION_TTL }
    }

    fn sessions(&self) -> mongodb::Collection<Document> {
        self.conn.database().collection(SESSIONS)
    }
}

fn expires_after(id: &str, ttl: Duration) -> KvStoreResult<DateTime> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .map(DateTime::from_chrono)
        .ok_or_else(|| KvStoreError::InvalidValue(id.to_string(), format!("session ttl of {:?} is out of range", ttl)))
}

fn live(id: &str) -> Document {
    doc! { "_id": id, "expires": { "$gt": DateTime::now() } }
}

fn millis(id: &str, ttl: Duration) -> KvStoreResult<i64> {
    i64::try_from(ttl.as_millis())
        .map_err(|_| KvStoreError::InvalidValue(id.to_string(), format!("session ttl of {:?} is out of range", ttl)))
}

/// Update pipeline restarting a session's lifetime from its stored `ttl`, or from
/// `default_millis` for sessions stored without one.
fn renewal(default_millis: i64) -> Vec<Document> {
    vec![doc! {
        "$set": {
            "expires": { "$add": ["$$NOW", { "$ifNull": ["$ttl", default_millis] }] }
        }
    }]
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn get(&self, id: &str) -> KvStoreResult<Option<Value>> {
        let row = self
            .sessions()
            .find_one(live(id))
            .await
            .map_err(operation_error)?;

        match row.as_ref().and_then(|row| row.get_str("session").ok()) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, id: &str, session: &Value, ttl: Option<Duration>) -> KvStoreResult<()> {
        let ttl = ttl.unwrap_or(self.ttl);
        let expires = expires_after(id, ttl)?;

        self.sessions()
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "session": serde_json::to_string(session)?,
                        "expires": expires,
                        "ttl": millis(id, ttl)?,
                    }
                },
            )
            .upsert(true)
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn destroy(&self, id: &str) -> KvStoreResult<()> {
        self.sessions()
            .delete_one(doc! { "_id": id })
            .await
            .map_err(operation_error)?;

        Ok(())
    }

    async fn touch(&self, id: &str) -> KvStoreResult<()> {
        self.sessions()
            .update_one(live(id), renewal(millis(id, self.ttl)?))
            .await
            .map_err(operation_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lifetime_is_two_weeks() {
        let expires = expires_after("abc", DEFAULT_SESSION_TTL).unwrap();
        let days = (expires.timestamp_millis() - DateTime::now().timestamp_millis()) / 86_400_000;

        assert!((13..=14).contains(&days));
    }

    #[test]
    fn absurd_lifetimes_are_rejected() {
        assert!(expires_after("abc", Duration::from_secs(u64::MAX)).is_err());
        assert!(millis("abc", Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn touch_renews_from_the_stored_ttl() {
        let default = millis("abc", DEFAULT_SESSION_TTL).unwrap();

        assert_eq!(default, 1_209_600_000);
        assert_eq!(
            renewal(default),
            vec![doc! {
                "$set": {
                    "expires": { "$add": ["$$NOW", { "$ifNull": ["$ttl", 1_209_600_000_i64] }] }
                }
            }]
        );
    }
}
