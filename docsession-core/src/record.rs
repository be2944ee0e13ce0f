//! Request-scoped session record.

use crate::codec::Payload;
use crate::error::{SessionError, SessionResult};
use crate::identifier::SessionId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Session state for a single request.
///
/// Created by [`SessionManager::open`](crate::manager::SessionManager::open)
/// and consumed by [`SessionManager::save`](crate::manager::SessionManager::save).
/// Every mutation goes through the accessors below, which raise the dirty
/// bit. The bit never drops back to clean for the lifetime of the record.
///
/// Not `Clone`: a record is saved at most once.
///
/// ```compile_fail
/// fn requires_clone<T: Clone>() {}
/// requires_clone::<docsession_core::SessionRecord>();
/// ```
#[derive(Debug)]
pub struct SessionRecord {
    id: SessionId,
    payload: Payload,
    is_new: bool,
    modified: bool,
    permanent: bool,
    created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh, empty session that has never been stored.
    pub fn fresh(id: SessionId) -> Self {
        Self {
            id,
            payload: Payload::new(),
            is_new: true,
            modified: false,
            permanent: false,
            created_at: Utc::now(),
        }
    }

    /// A session rebuilt from a stored record.
    pub fn hydrated(
        id: SessionId,
        payload: Payload,
        permanent: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payload,
            is_new: false,
            modified: false,
            permanent,
            created_at,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// True until the session has been persisted at least once.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// True once the payload or the permanent flag changed.
    pub fn is_dirty(&self) -> bool {
        self.modified
    }

    /// Whether the session asks for the long-lived cookie.
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Request (or drop) the long-lived cookie expiration.
    pub fn set_permanent(&mut self, permanent: bool) {
        if self.permanent != permanent {
            self.permanent = permanent;
            self.modified = true;
        }
    }

    /// When the session was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get a typed value from the session.
    ///
    /// Returns `None` if the key is missing or the value does not
    /// deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw value stored under a key.
    pub fn get_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Set a typed value in the session.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> SessionResult<()> {
        let json_value =
            serde_json::to_value(value).map_err(|e| SessionError::Serialization(e.to_string()))?;
        self.insert_value(key, json_value);
        Ok(())
    }

    /// Insert a raw value, returning the previous one.
    pub fn insert_value(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.modified = true;
        self.payload.insert(key.into(), value)
    }

    /// Remove a value from the session.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        let removed = self.payload.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    /// Remove every value from the session.
    pub fn clear(&mut self) {
        if !self.payload.is_empty() {
            self.payload.clear();
            self.modified = true;
        }
    }

    /// Check if a key exists in the session.
    pub fn contains(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }

    /// Iterate over the session keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.payload.keys().map(String::as_str)
    }

    /// Number of keys in the session.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the session holds no keys.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Read-only view of the whole payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}
