//! Server-side HTTP sessions backed by a document database.
//!
//! The client only ever holds a small identifier cookie. The session payload
//! lives in a database record keyed by that identifier, loaded when a request
//! arrives and written back when the response goes out.
//!
//! # Lifecycle
//!
//! 1. [`SessionManager::open`] reads the session cookie. No cookie, an empty
//!    value, or a malformed identifier yields a fresh session without a
//!    database round trip. A known identifier is looked up in the
//!    [`SessionStore`]; a missing, expired, or undecodable record also
//!    yields a fresh session under a newly generated identifier.
//! 2. The application reads and mutates the [`SessionRecord`]. Every mutation
//!    raises the record's dirty bit.
//! 3. [`SessionManager::save`] consumes the record. Empty sessions are
//!    deleted from storage (and their cookie cleared if the application
//!    emptied them); non-empty sessions are always upserted and the cookie
//!    is written with the configured expiration.
//!
//! Store failures are the only errors that escape the lifecycle. Corrupt
//! payloads and malformed cookies are recovered by starting over.
//!
//! # Features
//!
//! - `couchdb` - CouchDB document storage (enabled by default)
//! - `redis` - Redis key-value storage
//! - `msgpack` - MessagePack payload codec
//!
//! # Examples
//!
//! ```
//! use docsession_core::*;
//! use http::{Request, Response};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), SessionError> {
//! let db = MemoryDatabase::new();
//! let config = SessionConfig::new("app_sessions")
//!     .with_cookie_secure(true)
//!     .with_permanent_lifetime(Duration::from_secs(3600));
//! let manager = SessionManager::new(db.collection("app_sessions")?, config)?;
//!
//! // Per request
//! let request = Request::builder().uri("/login").body(()).unwrap();
//! let mut session = manager.open_request(&request).await?;
//! session.set("user_id", 123)?;
//! session.set_permanent(true);
//!
//! let mut response = Response::new(());
//! manager.save_response(session, &mut response).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod cookie;
pub mod error;
pub mod identifier;
pub mod manager;
pub mod record;
pub mod store;

pub use codec::{JsonCodec, Payload, PayloadCodec};
pub use config::{MAX_PERMANENT_LIFETIME, SessionConfig};
pub use cookie::{CookieCodec, SameSite};
pub use error::{SessionError, SessionResult};
pub use identifier::{SessionId, is_valid_session_id};
pub use manager::{SaveOutcome, SessionManager};
pub use record::SessionRecord;
pub use store::{MemoryDatabase, MemoryStore, SessionStore, StoredRecord};

#[cfg(feature = "msgpack")]
pub use codec::MessagePackCodec;

#[cfg(feature = "couchdb")]
pub use config::CouchDbConfig;
#[cfg(feature = "couchdb")]
pub use store::CouchDbStore;

#[cfg(feature = "redis")]
pub use config::RedisConfig;
#[cfg(feature = "redis")]
pub use store::RedisStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{JsonCodec, Payload, PayloadCodec};
    pub use crate::config::SessionConfig;
    pub use crate::cookie::SameSite;
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::identifier::SessionId;
    pub use crate::manager::{SaveOutcome, SessionManager};
    pub use crate::record::SessionRecord;
    pub use crate::store::{MemoryDatabase, MemoryStore, SessionStore, StoredRecord};

    #[cfg(feature = "couchdb")]
    pub use crate::{config::CouchDbConfig, store::CouchDbStore};

    #[cfg(feature = "redis")]
    pub use crate::{config::RedisConfig, store::RedisStore};
}
