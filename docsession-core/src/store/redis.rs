//! Redis session storage implementation.
//!
//! The key-value variant of [`SessionStore`]. Permanent sessions are written
//! with a native Redis TTL, so the server drops them when they expire.

use crate::config::{RedisConfig, validate_collection_name};
use crate::error::{SessionError, SessionResult};
use crate::identifier::SessionId;
use crate::store::{SessionStore, StoredRecord, base64_bytes};
use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value stored under each session key.
#[derive(Debug, Serialize, Deserialize)]
struct RedisEntry {
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
    #[serde(default)]
    permanent: bool,
    #[serde(with = "ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    last_write_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds_option", default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Redis-backed session store.
///
/// # Examples
///
/// ```no_run
/// use docsession_core::{RedisConfig, RedisStore, SessionConfig, SessionManager};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SessionConfig::new("myapp");
///     let redis = RedisConfig::new("redis://localhost:6379")?;
///
///     let store = RedisStore::new(redis, &config.collection_name).await?;
///     let manager = SessionManager::new(store, config)?;
///     Ok(())
/// }
/// ```
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisConfig,
    collection: String,
}

impl RedisStore {
    /// Create a new Redis session store.
    pub async fn new(config: RedisConfig, collection: &str) -> SessionResult<Self> {
        let client = ::redis::Client::open(config.url.as_str())
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        let conn = ConnectionManager::new(client).await?;

        Self::with_connection(conn, config, collection)
    }

    /// Create a store over an existing connection manager.
    pub fn with_connection(
        conn: ConnectionManager,
        config: RedisConfig,
        collection: &str,
    ) -> SessionResult<Self> {
        validate_collection_name(collection)?;

        Ok(Self {
            conn,
            config,
            collection: collection.to_string(),
        })
    }

    /// Get the key for a given session ID.
    fn session_key(&self, id: &SessionId) -> String {
        self.config.session_key(&self.collection, id.as_str())
    }

    fn key_pattern(&self) -> String {
        format!("{}:{}:*", self.config.key_prefix, self.collection)
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find_by_id(&self, id: &SessionId) -> SessionResult<Option<StoredRecord>> {
        let key = self.session_key(id);
        let mut conn = self.conn.clone();

        let data: Option<String> = conn.get(&key).await?;

        let Some(json) = data else {
            return Ok(None);
        };

        let entry: RedisEntry = serde_json::from_str(&json)
            .map_err(|e| SessionError::CorruptPayload(e.to_string()))?;

        let record = StoredRecord {
            id: id.clone(),
            data: entry.data,
            permanent: entry.permanent,
            created_at: entry.created_at,
            last_write_at: entry.last_write_at,
            expires_at: entry.expires_at,
        };

        // Clock skew against the server; its TTL removes the key.
        if record.is_expired() {
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn upsert(&self, record: &StoredRecord) -> SessionResult<()> {
        let key = self.session_key(&record.id);
        let mut conn = self.conn.clone();

        let entry = RedisEntry {
            data: record.data.clone(),
            permanent: record.permanent,
            created_at: record.created_at,
            last_write_at: record.last_write_at,
            expires_at: record.expires_at,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        match record.expires_at {
            Some(expires_at) => {
                // Calculate remaining TTL
                let remaining = (expires_at - record.last_write_at).num_seconds().max(1) as u64;
                let _: () = conn.set_ex(&key, json, remaining).await?;
            }
            None => {
                let _: () = conn.set(&key, json).await?;
            }
        }

        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> SessionResult<()> {
        let key = self.session_key(id);
        let mut conn = self.conn.clone();

        let _: () = conn.del(&key).await?;

        Ok(())
    }

    async fn count(&self) -> SessionResult<usize> {
        let mut conn = self.conn.clone();

        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(self.key_pattern())
            .query_async(&mut conn)
            .await?;

        Ok(keys.len())
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        // Redis automatically expires keys with TTL
        Ok(0)
    }
}
