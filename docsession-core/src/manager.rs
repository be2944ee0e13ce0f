//! Session lifecycle: load on request, persist on response.

use crate::codec::{JsonCodec, PayloadCodec};
use crate::config::SessionConfig;
use crate::cookie::CookieCodec;
use crate::error::{SessionError, SessionResult};
use crate::identifier::SessionId;
use crate::record::SessionRecord;
use crate::store::{SessionStore, StoredRecord};
use chrono::{DateTime, TimeDelta, Utc};
use http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What [`SessionManager::save`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record was written and a session cookie was set.
    Persisted {
        /// Cookie expiration, `None` for a browser-session cookie
        expires_at: Option<DateTime<Utc>>,
    },
    /// The stored record was removed because the session is now empty.
    Deleted,
    /// Nothing was stored or deleted.
    Skipped,
}

/// Orchestrates the per-request session lifecycle.
///
/// Build one manager per (store, configuration) pair at startup and hand it
/// to the request layer. Cloning is cheap and clones share the store.
///
/// # Examples
///
/// ```
/// use docsession_core::{MemoryDatabase, SessionConfig, SessionManager};
/// use http::HeaderMap;
///
/// # async fn example() -> docsession_core::SessionResult<()> {
/// let db = MemoryDatabase::new();
/// let config = SessionConfig::new("sessions");
/// let manager = SessionManager::new(db.collection("sessions")?, config)?;
///
/// let mut session = manager.open(&HeaderMap::new()).await?;
/// session.set("user_id", 42)?;
///
/// let mut response_headers = HeaderMap::new();
/// manager.save(session, &mut response_headers).await?;
/// assert!(response_headers.contains_key(http::header::SET_COOKIE));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn PayloadCodec>,
    cookies: CookieCodec,
    config: Arc<SessionConfig>,
    lifetime: Option<TimeDelta>,
}

impl SessionManager {
    /// Create a manager over a store.
    ///
    /// Fails with [`SessionError::Config`] if the configuration is invalid or
    /// the store is scoped to a different collection than
    /// `config.collection_name`.
    pub fn new(store: impl SessionStore + 'static, config: SessionConfig) -> SessionResult<Self> {
        Self::from_arc(Arc::new(store), config)
    }

    /// Create a manager over a shared store.
    pub fn from_arc(store: Arc<dyn SessionStore>, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;

        if store.collection() != config.collection_name {
            return Err(SessionError::Config(format!(
                "Store is scoped to collection '{}' but the configuration names '{}'",
                store.collection(),
                config.collection_name
            )));
        }

        Ok(Self {
            store,
            codec: Arc::new(JsonCodec),
            cookies: CookieCodec::new(&config),
            lifetime: config.lifetime_delta()?,
            config: Arc::new(config),
        })
    }

    /// Use a different payload codec.
    pub fn with_codec(mut self, codec: impl PayloadCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Cookie codec built from the configuration.
    pub fn cookies(&self) -> &CookieCodec {
        &self.cookies
    }

    /// Open the session for an incoming request.
    ///
    /// Requests without a usable session cookie get a fresh session without
    /// touching the store. Only
    /// [`SessionError::StoreUnavailable`] is returned.
    pub async fn open(&self, headers: &HeaderMap) -> SessionResult<SessionRecord> {
        match self.cookies.read_identifier(headers) {
            Some(id) => self.load(id).await,
            None => Ok(self.fresh()),
        }
    }

    /// Open the session for an [`http::Request`].
    pub async fn open_request<B>(&self, request: &http::Request<B>) -> SessionResult<SessionRecord> {
        self.open(request.headers()).await
    }

    /// Load the session stored under `id`, or start a fresh one with a new
    /// identifier if there is nothing usable stored.
    pub async fn load(&self, id: SessionId) -> SessionResult<SessionRecord> {
        let stored = match self.store.find_by_id(&id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(
                    session_id = %id.short(),
                    collection = %self.store.collection(),
                    "No stored session, starting fresh"
                );
                return Ok(self.fresh());
            }
            Err(SessionError::CorruptPayload(reason)) => {
                warn!(
                    session_id = %id.short(),
                    collection = %self.store.collection(),
                    %reason,
                    "Unreadable session document, starting fresh"
                );
                return Ok(self.fresh());
            }
            Err(e) => return Err(e),
        };

        if stored.is_expired() {
            debug!(session_id = %id.short(), "Stored session expired, starting fresh");
            return Ok(self.fresh());
        }

        match self.codec.decode(&stored.data) {
            Ok(payload) => {
                debug!(session_id = %id.short(), keys = payload.len(), "Session loaded");
                Ok(SessionRecord::hydrated(
                    id,
                    payload,
                    stored.permanent,
                    stored.created_at,
                ))
            }
            Err(e) => {
                warn!(
                    session_id = %id.short(),
                    codec = self.codec.name(),
                    error = %e,
                    "Corrupt session payload, starting fresh"
                );
                Ok(self.fresh())
            }
        }
    }

    /// Persist a session and write the response cookie.
    ///
    /// Empty sessions are never stored: a previously stored one is deleted,
    /// and the client is told to drop its cookie if the application emptied
    /// the session during this request. Non-empty sessions are always
    /// upserted, changed or not, which keeps `last_write_at` fresh.
    ///
    /// A store failure is returned before any cookie is written.
    pub async fn save(
        &self,
        record: SessionRecord,
        headers: &mut HeaderMap,
    ) -> SessionResult<SaveOutcome> {
        if record.is_empty() {
            let mut outcome = SaveOutcome::Skipped;

            if !record.is_new() {
                self.store.delete(record.id()).await?;
                outcome = SaveOutcome::Deleted;
            }

            if record.is_dirty() {
                self.cookies.write_delete_cookie(headers);
            }

            debug!(
                session_id = %record.id().short(),
                outcome = ?outcome,
                cookie_cleared = record.is_dirty(),
                "Empty session"
            );
            return Ok(outcome);
        }

        let now = Utc::now();
        let expires_at = self.expiration_for(&record, now);

        let stored = StoredRecord {
            id: record.id().clone(),
            data: self.codec.encode(record.payload())?,
            permanent: record.is_permanent(),
            created_at: record.created_at(),
            last_write_at: now,
            expires_at,
        };

        self.store.upsert(&stored).await?;
        self.cookies.write_cookie(headers, record.id(), expires_at);

        debug!(
            session_id = %record.id().short(),
            collection = %self.store.collection(),
            dirty = record.is_dirty(),
            permanent = record.is_permanent(),
            "Session persisted"
        );

        Ok(SaveOutcome::Persisted { expires_at })
    }

    /// Persist a session onto an [`http::Response`].
    pub async fn save_response<B>(
        &self,
        record: SessionRecord,
        response: &mut http::Response<B>,
    ) -> SessionResult<SaveOutcome> {
        self.save(record, response.headers_mut()).await
    }

    /// Expiration of the session cookie and stored record.
    ///
    /// Only permanent sessions expire, and only when a permanent lifetime is
    /// configured. An expiration past the end of the calendar yields `None`.
    pub fn expiration_for(&self, record: &SessionRecord, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !record.is_permanent() {
            return None;
        }
        self.lifetime.and_then(|lifetime| now.checked_add_signed(lifetime))
    }

    fn fresh(&self) -> SessionRecord {
        SessionRecord::fresh(SessionId::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Payload;
    use crate::config::MAX_PERMANENT_LIFETIME;
    use crate::store::MemoryDatabase;
    use http::header::{COOKIE, SET_COOKIE};
    use http::HeaderValue;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> SessionManager {
        let db = MemoryDatabase::new();
        SessionManager::new(db.collection("sessions").unwrap(), SessionConfig::default()).unwrap()
    }

    fn cookie_for(id: &SessionId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("session={}", id)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_collection_mismatch_rejected() {
        let db = MemoryDatabase::new();
        let result = SessionManager::new(db.collection("other").unwrap(), SessionConfig::default());
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_without_cookie_is_fresh() {
        let session = manager().open(&HeaderMap::new()).await.unwrap();
        assert!(session.is_new());
        assert!(session.is_empty());
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_unknown_id_gets_new_identifier() {
        let manager = manager();
        let stale = SessionId::generate();
        let session = manager.open(&cookie_for(&stale)).await.unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), &stale);
    }

    #[tokio::test]
    async fn test_corrupt_payload_starts_fresh() {
        let manager = manager();
        let id = SessionId::generate();
        let now = Utc::now();
        manager
            .store()
            .upsert(&StoredRecord {
                id: id.clone(),
                data: b"\xff\xfe garbage".to_vec(),
                permanent: false,
                created_at: now,
                last_write_at: now,
                expires_at: None,
            })
            .await
            .unwrap();

        let session = manager.open(&cookie_for(&id)).await.unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), &id);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let manager = manager();
        let mut session = manager.open(&HeaderMap::new()).await.unwrap();
        let id = session.id().clone();
        session.set("data", json!({"n": [1, 2, 3]})).unwrap();

        let mut headers = HeaderMap::new();
        let outcome = manager.save(session, &mut headers).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Persisted { expires_at: None });
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 1);

        let reloaded = manager.open(&cookie_for(&id)).await.unwrap();
        assert!(!reloaded.is_new());
        assert!(!reloaded.is_dirty());
        assert_eq!(reloaded.id(), &id);
        assert_eq!(reloaded.get_value("data"), Some(&json!({"n": [1, 2, 3]})));
    }

    #[tokio::test]
    async fn test_fresh_untouched_session_is_skipped() {
        let manager = manager();
        let session = manager.open(&HeaderMap::new()).await.unwrap();

        let mut headers = HeaderMap::new();
        let outcome = manager.save(session, &mut headers).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);
        assert!(headers.is_empty());
        assert_eq!(manager.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_session_emptied_clears_cookie_without_delete() {
        let manager = manager();
        let mut session = manager.open(&HeaderMap::new()).await.unwrap();
        session.set("a", 1).unwrap();
        session.remove("a");

        let mut headers = HeaderMap::new();
        let outcome = manager.save(session, &mut headers).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);
        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_permanent_expiration() {
        let db = MemoryDatabase::new();
        let config = SessionConfig::default().with_permanent_lifetime(Duration::from_secs(60));
        let manager = SessionManager::new(db.collection("sessions").unwrap(), config).unwrap();

        let mut session = manager.open(&HeaderMap::new()).await.unwrap();
        assert_eq!(manager.expiration_for(&session, Utc::now()), None);

        session.set_permanent(true);
        let now = Utc::now();
        assert_eq!(
            manager.expiration_for(&session, now),
            Some(now + TimeDelta::seconds(60))
        );

        session.set("k", "v").unwrap();
        let id = session.id().clone();
        let mut headers = HeaderMap::new();
        let outcome = manager.save(session, &mut headers).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Persisted { expires_at: Some(_) }));

        let cookie = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Expires="));

        let stored = manager.store().find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.permanent);
        assert!(stored.expires_at.is_some());

        let reloaded = manager.load(id).await.unwrap();
        assert!(reloaded.is_permanent());
    }

    #[test]
    fn test_oversized_lifetime_rejected_at_construction() {
        let db = MemoryDatabase::new();
        let config = SessionConfig::default()
            .with_permanent_lifetime(Duration::from_secs(1_000_000 * 365 * 86_400));
        let result = SessionManager::new(db.collection("sessions").unwrap(), config);
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test]
    async fn test_expiration_at_calendar_end_does_not_panic() {
        let db = MemoryDatabase::new();
        let config = SessionConfig::default().with_permanent_lifetime(MAX_PERMANENT_LIFETIME);
        let manager = SessionManager::new(db.collection("sessions").unwrap(), config).unwrap();

        let mut session = manager.open(&HeaderMap::new()).await.unwrap();
        session.set_permanent(true);
        assert_eq!(manager.expiration_for(&session, DateTime::<Utc>::MAX_UTC), None);

        session.set("k", "v").unwrap();
        let outcome = manager.save(session, &mut HeaderMap::new()).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Persisted { expires_at: Some(_) }));
    }

    #[tokio::test]
    async fn test_permanent_without_lifetime_is_session_cookie() {
        let manager = manager();
        let mut session = manager.open(&HeaderMap::new()).await.unwrap();
        session.set_permanent(true);
        assert_eq!(manager.expiration_for(&session, Utc::now()), None);
    }

    #[tokio::test]
    async fn test_hydrated_record_keeps_created_at() {
        let manager = manager();
        let id = SessionId::generate();
        let created = Utc::now() - TimeDelta::days(3);
        let mut payload = Payload::new();
        payload.insert("k".into(), json!(1));
        let session = SessionRecord::hydrated(id.clone(), payload, false, created);

        manager.save(session, &mut HeaderMap::new()).await.unwrap();

        let stored = manager.store().find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, created);
        assert!(stored.last_write_at > created);
    }
}
