//! CouchDB session storage implementation.
//!
//! This module requires the `couchdb` feature flag.

use crate::config::{CouchDbConfig, validate_collection_name};
use crate::error::{SessionError, SessionResult};
use crate::identifier::SessionId;
use crate::store::{SessionStore, StoredRecord, base64_bytes};
use async_trait::async_trait;
use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Attempts made when another writer bumps the document revision between
/// our read and our write.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// Documents fetched per `_find` page during cleanup.
const CLEANUP_BATCH: usize = 500;

/// CouchDB document wrapper for sessions.
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    collection: String,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
    #[serde(default)]
    permanent: bool,
    #[serde(with = "ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    last_write_at: DateTime<Utc>,
    #[serde(
        with = "ts_milliseconds_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    expires_at: Option<DateTime<Utc>>,
}

impl SessionDocument {
    fn into_record(self, id: &SessionId) -> StoredRecord {
        StoredRecord {
            id: id.clone(),
            data: self.data,
            permanent: self.permanent,
            created_at: self.created_at,
            last_write_at: self.last_write_at,
            expires_at: self.expires_at,
        }
    }
}

/// CouchDB-backed session store.
///
/// Each store is scoped to one collection inside one CouchDB database.
/// Documents are keyed `"{collection}:{session_id}"` and carry a
/// `collection` field so maintenance queries stay inside the namespace.
///
/// # Database Setup
///
/// Create the database, and optionally an index for expiry cleanup:
///
/// ```bash
/// curl -X PUT http://localhost:5984/sessions
///
/// curl -X POST http://localhost:5984/sessions/_index \
///   -H "Content-Type: application/json" \
///   -d '{"index": {"fields": ["collection", "expires_at"]}, "name": "by_expiration"}'
/// ```
///
/// # Examples
///
/// ```ignore
/// use docsession_core::{CouchDbConfig, CouchDbStore, SessionConfig, SessionManager};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SessionConfig::new("myapp");
///     let couch = CouchDbConfig::new("http://localhost:5984", "sessions")?
///         .with_auth("admin", "password");
///
///     let store = CouchDbStore::new(couch, &config.collection_name).await?;
///     let manager = SessionManager::new(store, config)?;
///     Ok(())
/// }
/// ```
pub struct CouchDbStore {
    client: Client,
    config: CouchDbConfig,
    collection: String,
    base_url: String,
}

impl CouchDbStore {
    /// Create a new CouchDB session store.
    ///
    /// Verifies that the database exists before returning.
    pub async fn new(config: CouchDbConfig, collection: &str) -> SessionResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        Self::with_client(client, config, collection).await
    }

    /// Create a store sharing an existing HTTP client.
    ///
    /// Several applications can share one client (and its connection pool)
    /// while keeping separate collections.
    pub async fn with_client(
        client: Client,
        config: CouchDbConfig,
        collection: &str,
    ) -> SessionResult<Self> {
        validate_collection_name(collection)?;

        let store = Self {
            client,
            base_url: config.database_url(),
            config,
            collection: collection.to_string(),
        };

        let response = store
            .request(Method::HEAD, &store.base_url)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SessionError::StoreUnavailable(format!(
                "Failed to connect to CouchDB database '{}': {}",
                store.config.database,
                response.status()
            )));
        }

        debug!(
            database = %store.config.database,
            collection = %store.collection,
            "CouchDB session store ready"
        );

        Ok(store)
    }

    /// Get the document ID for a session.
    fn doc_id(&self, id: &SessionId) -> String {
        format!("{}:{}", self.collection, id)
    }

    fn doc_url(&self, id: &SessionId) -> String {
        format!("{}/{}", self.base_url, self.doc_id(id))
    }

    /// Build an authenticated request.
    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(username, Some(password));
        }

        request
    }

    /// Delete one specific revision of a session document.
    ///
    /// A conflict means the document was rewritten after `rev` was read;
    /// the newer revision is left alone.
    async fn delete_revision(&self, id: &SessionId, rev: &str) -> SessionResult<()> {
        let response = self
            .request(Method::DELETE, &self.doc_url(id))
            .query(&[("rev", rev)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success()
            || status == StatusCode::NOT_FOUND
            || status == StatusCode::CONFLICT
        {
            return Ok(());
        }

        Err(SessionError::StoreUnavailable(format!(
            "Failed to delete expired session: {}",
            status
        )))
    }

    /// Current revision of a session document, read from the `ETag` of a
    /// `HEAD` request.
    async fn current_rev(&self, id: &SessionId) -> SessionResult<Option<String>> {
        let response = self
            .request(Method::HEAD, &self.doc_url(id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(SessionError::StoreUnavailable(format!(
                "Failed to read session revision: {}",
                response.status()
            )));
        }

        Ok(response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string()))
    }
}

#[async_trait]
impl SessionStore for CouchDbStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn find_by_id(&self, id: &SessionId) -> SessionResult<Option<StoredRecord>> {
        let response = self
            .request(Method::GET, &self.doc_url(id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(SessionError::StoreUnavailable(format!(
                "Failed to get session: {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        let doc: SessionDocument = serde_json::from_slice(&body)
            .map_err(|e| SessionError::CorruptPayload(e.to_string()))?;

        let rev = doc.rev.clone();
        let record = doc.into_record(id);
        if record.is_expired() {
            if let Some(rev) = rev {
                self.delete_revision(id, &rev).await?;
            }
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn upsert(&self, record: &StoredRecord) -> SessionResult<()> {
        let url = self.doc_url(&record.id);

        for attempt in 0..MAX_CONFLICT_RETRIES {
            let doc = SessionDocument {
                id: self.doc_id(&record.id),
                rev: self.current_rev(&record.id).await?,
                collection: self.collection.clone(),
                data: record.data.clone(),
                permanent: record.permanent,
                created_at: record.created_at,
                last_write_at: record.last_write_at,
                expires_at: record.expires_at,
            };

            let response = self.request(Method::PUT, &url).json(&doc).send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::CONFLICT {
                debug!(
                    session_id = %record.id.short(),
                    attempt,
                    "Revision conflict while saving session, retrying"
                );
                continue;
            }

            let error_text = response.text().await.unwrap_or_default();
            return Err(SessionError::StoreUnavailable(format!(
                "Failed to save session: {} {}",
                status, error_text
            )));
        }

        Err(SessionError::StoreUnavailable(format!(
            "Failed to save session: revision conflict persisted after {} attempts",
            MAX_CONFLICT_RETRIES
        )))
    }

    async fn delete(&self, id: &SessionId) -> SessionResult<()> {
        let url = self.doc_url(id);

        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some(rev) = self.current_rev(id).await? else {
                return Ok(()); // Already deleted
            };

            let response = self
                .request(Method::DELETE, &url)
                .query(&[("rev", rev.as_str())])
                .send()
                .await?;

            let status = response.status();
            if status.is_success() || status == StatusCode::NOT_FOUND {
                return Ok(());
            }

            if status != StatusCode::CONFLICT {
                return Err(SessionError::StoreUnavailable(format!(
                    "Failed to delete session: {}",
                    status
                )));
            }
        }

        Err(SessionError::StoreUnavailable(format!(
            "Failed to delete session: revision conflict persisted after {} attempts",
            MAX_CONFLICT_RETRIES
        )))
    }

    async fn count(&self) -> SessionResult<usize> {
        let url = format!("{}/_all_docs", self.base_url);
        let start_key = json!(format!("{}:", self.collection)).to_string();
        let end_key = json!(format!("{}:\u{fff0}", self.collection)).to_string();

        let response = self
            .request(Method::GET, &url)
            .query(&[("startkey", start_key), ("endkey", end_key)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SessionError::StoreUnavailable(format!(
                "Failed to count sessions: {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct AllDocsResponse {
            rows: Vec<serde::de::IgnoredAny>,
        }

        let docs: AllDocsResponse = response
            .json()
            .await
            .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        Ok(docs.rows.len())
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        #[derive(Deserialize)]
        struct FindResponse {
            docs: Vec<DocRef>,
        }

        #[derive(Deserialize)]
        struct DocRef {
            #[serde(rename = "_id")]
            id: String,
            #[serde(rename = "_rev")]
            rev: String,
        }

        #[derive(Deserialize)]
        struct BulkResult {
            #[serde(default)]
            ok: bool,
        }

        let now = Utc::now().timestamp_millis();
        let mut deleted = 0;

        loop {
            let response = self
                .request(Method::POST, &format!("{}/_find", self.base_url))
                .json(&json!({
                    "selector": {
                        "collection": self.collection,
                        "expires_at": { "$lt": now },
                    },
                    "fields": ["_id", "_rev"],
                    "limit": CLEANUP_BATCH,
                }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SessionError::StoreUnavailable(format!(
                    "Failed to query expired sessions: {}",
                    response.status()
                )));
            }

            let found: FindResponse = response
                .json()
                .await
                .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

            if found.docs.is_empty() {
                break;
            }

            let batch_len = found.docs.len();
            let tombstones: Vec<_> = found
                .docs
                .into_iter()
                .map(|doc| json!({ "_id": doc.id, "_rev": doc.rev, "_deleted": true }))
                .collect();

            let response = self
                .request(Method::POST, &format!("{}/_bulk_docs", self.base_url))
                .json(&json!({ "docs": tombstones }))
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SessionError::StoreUnavailable(format!(
                    "Failed to delete expired sessions: {}",
                    response.status()
                )));
            }

            let results: Vec<BulkResult> = response
                .json()
                .await
                .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;
            let removed = results.iter().filter(|r| r.ok).count();
            deleted += removed;

            // Stop when the page was short or nothing could be removed, so
            // conflicting documents cannot keep the loop alive.
            if batch_len < CLEANUP_BATCH || removed == 0 {
                break;
            }
        }

        debug!(collection = %self.collection, deleted, "Expired sessions removed");
        Ok(deleted)
    }
}
