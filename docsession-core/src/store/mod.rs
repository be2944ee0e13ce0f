//! Session store trait definition and backends.
//!
//! A store is scoped to one collection (namespace) inside one database.
//! Separate applications get separate store instances; two stores over
//! different collections never observe each other's records, even for the
//! same identifier.

use crate::error::SessionResult;
use crate::identifier::SessionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;

#[cfg(feature = "couchdb")]
pub mod couchdb;

#[cfg(feature = "redis")]
pub mod redis;

pub use memory::{MemoryDatabase, MemoryStore};

#[cfg(feature = "couchdb")]
pub use couchdb::CouchDbStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// A session record as held by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Session identifier (primary key)
    pub id: SessionId,
    /// Codec-encoded payload
    pub data: Vec<u8>,
    /// Whether the session uses the long-lived cookie
    pub permanent: bool,
    /// First write of this session
    pub created_at: DateTime<Utc>,
    /// Most recent upsert
    pub last_write_at: DateTime<Utc>,
    /// Instant after which the record is stale
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Check whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Check whether the record has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Persistence gateway for session records.
///
/// Implementations only fail with
/// [`SessionError::StoreUnavailable`](crate::error::SessionError::StoreUnavailable)
/// on transport or server errors, or with
/// [`SessionError::CorruptPayload`](crate::error::SessionError::CorruptPayload)
/// when a stored document cannot be read back. A missing record is never an
/// error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Collection this store is scoped to.
    fn collection(&self) -> &str;

    /// Find a record by identifier.
    ///
    /// Returns `Ok(None)` if no record exists or the record has expired.
    async fn find_by_id(&self, id: &SessionId) -> SessionResult<Option<StoredRecord>>;

    /// Insert or replace the record for `record.id`.
    async fn upsert(&self, record: &StoredRecord) -> SessionResult<()>;

    /// Remove the record for `id`. Deleting a missing record succeeds.
    async fn delete(&self, id: &SessionId) -> SessionResult<()>;

    /// Number of records in this collection.
    async fn count(&self) -> SessionResult<usize>;

    /// Remove expired records, returning how many were removed.
    async fn cleanup_expired(&self) -> SessionResult<usize>;
}

/// Serde helper storing payload bytes as a base64 string in JSON documents.
#[cfg(any(feature = "couchdb", feature = "redis"))]
pub(crate) mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn record(expires_at: Option<DateTime<Utc>>) -> StoredRecord {
        let now = Utc::now();
        StoredRecord {
            id: SessionId::generate(),
            data: b"{}".to_vec(),
            permanent: expires_at.is_some(),
            created_at: now,
            last_write_at: now,
            expires_at,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!record(None).is_expired_at(now));
        assert!(!record(Some(now + TimeDelta::seconds(5))).is_expired_at(now));
        assert!(record(Some(now - TimeDelta::seconds(5))).is_expired_at(now));
        assert!(record(Some(now)).is_expired_at(now));
    }
}
