//! In-memory session storage.
//!
//! Useful for tests, development, and single-process deployments. A
//! [`MemoryDatabase`] plays the part of one database holding named
//! collections; each [`MemoryStore`] is scoped to a single collection.

use crate::config::validate_collection_name;
use crate::error::SessionResult;
use crate::identifier::SessionId;
use crate::store::{SessionStore, StoredRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = HashMap<SessionId, StoredRecord>;

/// In-memory database holding session collections.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a store scoped to the named collection.
    pub fn collection(&self, name: &str) -> SessionResult<MemoryStore> {
        validate_collection_name(name)?;
        Ok(MemoryStore {
            database: self.clone(),
            collection: name.to_string(),
        })
    }

    /// Names of collections that currently hold records.
    pub async fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Session store over one collection of a [`MemoryDatabase`].
///
/// # Examples
///
/// ```
/// use docsession_core::store::{MemoryDatabase, SessionStore};
///
/// # async fn example() -> docsession_core::SessionResult<()> {
/// let db = MemoryDatabase::new();
/// let store = db.collection("sessions")?;
/// assert_eq!(store.count().await?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    database: MemoryDatabase,
    collection: String,
}

impl MemoryStore {
    /// Create a store backed by its own private database.
    pub fn new(collection: &str) -> SessionResult<Self> {
        MemoryDatabase::new().collection(collection)
    }

    /// Drop the record for `id` only if the copy under the write lock is
    /// still expired, so a concurrent upsert survives.
    async fn remove_if_expired(&self, id: &SessionId) {
        let now = Utc::now();
        let mut collections = self.database.collections.write().await;

        if let Some(records) = collections.get_mut(&self.collection) {
            if records.get(id).is_some_and(|record| record.is_expired_at(now)) {
                records.remove(id);
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find_by_id(&self, id: &SessionId) -> SessionResult<Option<StoredRecord>> {
        let found = {
            let collections = self.database.collections.read().await;
            collections
                .get(&self.collection)
                .and_then(|records| records.get(id))
                .cloned()
        };

        match found {
            Some(record) if record.is_expired() => {
                self.remove_if_expired(id).await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn upsert(&self, record: &StoredRecord) -> SessionResult<()> {
        self.database
            .collections
            .write()
            .await
            .entry(self.collection.clone())
            .or_default()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> SessionResult<()> {
        if let Some(records) = self
            .database
            .collections
            .write()
            .await
            .get_mut(&self.collection)
        {
            records.remove(id);
        }
        Ok(())
    }

    async fn count(&self) -> SessionResult<usize> {
        Ok(self
            .database
            .collections
            .read()
            .await
            .get(&self.collection)
            .map_or(0, HashMap::len))
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        let now = Utc::now();
        let mut collections = self.database.collections.write().await;
        let Some(records) = collections.get_mut(&self.collection) else {
            return Ok(0);
        };

        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        Ok(before - records.len())
    }
}
