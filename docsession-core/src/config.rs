//! Session configuration.

use crate::cookie::SameSite;
use crate::error::{SessionError, SessionResult};
use std::time::Duration;

/// Longest accepted permanent lifetime. Browsers clamp cookie expiry to
/// 400 days.
pub const MAX_PERMANENT_LIFETIME: Duration = Duration::from_secs(400 * 24 * 60 * 60);

/// Session lifecycle and cookie configuration.
///
/// Supplied by the embedding application when it builds a
/// [`SessionManager`](crate::manager::SessionManager).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Collection (namespace) holding this application's session records
    pub collection_name: String,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Cookie secure flag (HTTPS only)
    pub cookie_secure: bool,
    /// Cookie HttpOnly flag
    pub cookie_http_only: bool,
    /// Cookie domain
    pub cookie_domain: Option<String>,
    /// Cookie path
    pub cookie_path: Option<String>,
    /// Cookie SameSite policy, omitted when unset
    pub cookie_same_site: Option<SameSite>,
    /// Lifetime of permanent sessions; unset means session cookies only
    pub permanent_lifetime: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            collection_name: "sessions".to_string(),
            cookie_name: "session".to_string(),
            cookie_secure: false,
            cookie_http_only: true,
            cookie_domain: None,
            cookie_path: Some("/".to_string()),
            cookie_same_site: None,
            permanent_lifetime: None,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for the given collection.
    ///
    /// # Examples
    ///
    /// ```
    /// use docsession_core::SessionConfig;
    /// use std::time::Duration;
    ///
    /// let config = SessionConfig::new("app_sessions")
    ///     .with_cookie_secure(true)
    ///     .with_permanent_lifetime(Duration::from_secs(86400));
    ///
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    /// Set the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set cookie secure flag
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Set cookie HttpOnly flag
    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    /// Set cookie domain
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = Some(path.into());
        self
    }

    /// Set cookie SameSite policy
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = Some(same_site);
        self
    }

    /// Set the lifetime applied to sessions marked permanent.
    pub fn with_permanent_lifetime(mut self, lifetime: Duration) -> Self {
        self.permanent_lifetime = Some(lifetime);
        self
    }

    /// Check the configuration for values that would produce broken
    /// cookies or unscoped storage.
    pub fn validate(&self) -> SessionResult<()> {
        validate_collection_name(&self.collection_name)?;

        if self.cookie_name.is_empty()
            || !self
                .cookie_name
                .bytes()
                .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
        {
            return Err(SessionError::Config(format!(
                "Invalid cookie name '{}'",
                self.cookie_name
            )));
        }

        for (attr, value) in [("domain", &self.cookie_domain), ("path", &self.cookie_path)] {
            if let Some(value) = value {
                if value.is_empty() || value.contains(';') || value.chars().any(char::is_control) {
                    return Err(SessionError::Config(format!(
                        "Invalid cookie {} '{}'",
                        attr, value
                    )));
                }
            }
        }

        self.lifetime_delta()?;

        Ok(())
    }

    /// Permanent lifetime as a timestamp offset.
    pub(crate) fn lifetime_delta(&self) -> SessionResult<Option<chrono::TimeDelta>> {
        let Some(lifetime) = self.permanent_lifetime else {
            return Ok(None);
        };

        if lifetime > MAX_PERMANENT_LIFETIME {
            return Err(SessionError::Config(format!(
                "Permanent session lifetime {:?} exceeds the maximum of {:?}",
                lifetime, MAX_PERMANENT_LIFETIME
            )));
        }

        chrono::TimeDelta::from_std(lifetime).map(Some).map_err(|_| {
            SessionError::Config(format!(
                "Permanent session lifetime {:?} is out of range",
                lifetime
            ))
        })
    }
}

/// Validate a collection (namespace) name.
///
/// Collection names end up in document ids, URLs and key prefixes, so they
/// are restricted to `[A-Za-z0-9_.-]`.
pub fn validate_collection_name(name: &str) -> SessionResult<()> {
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
    {
        return Err(SessionError::Config(format!(
            "Invalid collection name '{}'",
            name
        )));
    }
    Ok(())
}

/// CouchDB connection configuration.
#[cfg(feature = "couchdb")]
#[derive(Debug, Clone)]
pub struct CouchDbConfig {
    /// Server URL
    pub url: String,
    /// Database holding session documents
    pub database: String,
    /// CouchDB username
    pub username: Option<String>,
    /// CouchDB password
    pub password: Option<String>,
}

#[cfg(feature = "couchdb")]
impl CouchDbConfig {
    /// Create a CouchDB configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - CouchDB connection URL (e.g., "http://localhost:5984")
    /// * `database` - Database name for sessions
    pub fn new(url: &str, database: &str) -> SessionResult<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SessionError::InvalidUrl(
                "CouchDB URL must start with http:// or https://".to_string(),
            ));
        }

        if database.is_empty() {
            return Err(SessionError::Config(
                "CouchDB database name is required".to_string(),
            ));
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            username: None,
            password: None,
        })
    }

    /// Set CouchDB authentication credentials.
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// URL of the session database.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.url, self.database)
    }
}

/// Redis connection configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL
    pub url: String,
    /// Prefix put in front of every session key
    pub key_prefix: String,
}

#[cfg(feature = "redis")]
impl RedisConfig {
    /// Create a Redis configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub fn new(url: &str) -> SessionResult<Self> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(SessionError::InvalidUrl(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(Self {
            url: url.to_string(),
            key_prefix: "session".to_string(),
        })
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Build the key for a session in a collection.
    pub fn session_key(&self, collection: &str, session_id: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, collection, session_id)
    }
}
