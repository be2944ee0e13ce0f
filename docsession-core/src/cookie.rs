//! Session cookie handling.

use crate::config::SessionConfig;
use crate::identifier::SessionId;
use chrono::{DateTime, Utc};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tracing::debug;

/// Expiry date sent when asking the client to drop the cookie.
const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Cookie SameSite attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Only sent on same-site requests
    Strict,
    /// Also sent on top-level cross-site navigation
    Lax,
    /// Sent on all requests; browsers require `Secure`
    None,
}

impl SameSite {
    /// Attribute value as written in `Set-Cookie`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Reads the session identifier from request cookies and writes the
/// session cookie onto responses.
#[derive(Debug, Clone)]
pub struct CookieCodec {
    name: String,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl CookieCodec {
    /// Build a codec from the cookie attributes of a session configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            domain: config.cookie_domain.clone(),
            path: config.cookie_path.clone(),
            secure: config.cookie_secure,
            http_only: config.cookie_http_only,
            same_site: config.cookie_same_site,
        }
    }

    /// Cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract the session identifier from the request's `Cookie` headers.
    ///
    /// A missing cookie, an empty value and a value that is not a well-formed
    /// identifier all yield `None`.
    pub fn read_identifier(&self, headers: &HeaderMap) -> Option<SessionId> {
        let raw = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == self.name)
            .map(|(_, value)| value.trim().trim_matches('"'))?;

        if raw.is_empty() {
            return None;
        }

        match SessionId::parse(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(cookie = %self.name, error = %e, "Ignoring malformed session cookie");
                None
            }
        }
    }

    /// Append a `Set-Cookie` header carrying the session identifier.
    ///
    /// `expires` is `None` for a browser-session cookie.
    pub fn write_cookie(
        &self,
        headers: &mut HeaderMap,
        id: &SessionId,
        expires: Option<DateTime<Utc>>,
    ) {
        let mut cookie = format!("{}={}", self.name, id);
        self.push_scope(&mut cookie);

        if let Some(expires) = expires {
            cookie.push_str(&format!("; Expires={}", http_date(expires)));
        }

        self.push_flags(&mut cookie);
        self.append(headers, cookie);
    }

    /// Append a `Set-Cookie` header telling the client to discard the
    /// session cookie.
    pub fn write_delete_cookie(&self, headers: &mut HeaderMap) {
        let mut cookie = format!("{}=", self.name);
        self.push_scope(&mut cookie);
        cookie.push_str(&format!("; Expires={}; Max-Age=0", EPOCH_EXPIRES));
        self.push_flags(&mut cookie);
        self.append(headers, cookie);
    }

    fn push_scope(&self, cookie: &mut String) {
        if let Some(ref path) = self.path {
            cookie.push_str(&format!("; Path={}", path));
        }

        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }
    }

    fn push_flags(&self, cookie: &mut String) {
        if self.secure {
            cookie.push_str("; Secure");
        }

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        if let Some(same_site) = self.same_site {
            cookie.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
    }

    fn append(&self, headers: &mut HeaderMap, cookie: String) {
        // Attributes are validated with the config, so this only fails on
        // values smuggled in through a hand-built `SessionConfig`.
        match HeaderValue::try_from(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => {
                debug!(cookie = %self.name, error = %e, "Dropping unrepresentable Set-Cookie header");
            }
        }
    }
}

/// Format a timestamp as an IMF-fixdate (RFC 7231).
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codec() -> CookieCodec {
        CookieCodec::new(&SessionConfig::default())
    }

    fn request_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_read_missing_cookie() {
        assert!(codec().read_identifier(&HeaderMap::new()).is_none());
        assert!(codec().read_identifier(&request_with("other=1")).is_none());
    }

    #[test]
    fn test_read_empty_and_invalid() {
        assert!(codec().read_identifier(&request_with("session=")).is_none());
        assert!(codec().read_identifier(&request_with("session=invalid")).is_none());
    }

    #[test]
    fn test_read_valid_among_others() {
        let id = SessionId::generate();
        let headers = request_with(&format!("theme=dark; session={}; lang=en", id));
        assert_eq!(codec().read_identifier(&headers), Some(id));
    }

    #[test]
    fn test_read_quoted_and_split_headers() {
        let id = SessionId::generate();
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(
            COOKIE,
            HeaderValue::from_str(&format!("session=\"{}\"", id)).unwrap(),
        );
        assert_eq!(codec().read_identifier(&headers), Some(id));
    }

    #[test]
    fn test_read_does_not_match_prefix_names() {
        let id = SessionId::generate();
        let headers = request_with(&format!("my_session={}", id));
        assert!(codec().read_identifier(&headers).is_none());
    }

    #[test]
    fn test_write_session_cookie() {
        let id = SessionId::generate();
        let mut headers = HeaderMap::new();
        codec().write_cookie(&mut headers, &id, None);

        let cookies = set_cookies(&headers);
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0], format!("session={}; Path=/; HttpOnly", id));
    }

    #[test]
    fn test_write_permanent_cookie_with_flags() {
        let config = SessionConfig::default()
            .with_cookie_secure(true)
            .with_cookie_domain("example.com")
            .with_cookie_same_site(SameSite::Strict);
        let codec = CookieCodec::new(&config);
        let id = SessionId::generate();
        let expires = Utc.with_ymd_and_hms(2030, 3, 4, 5, 6, 7).unwrap();

        let mut headers = HeaderMap::new();
        codec.write_cookie(&mut headers, &id, Some(expires));

        let cookie = &set_cookies(&headers)[0];
        assert_eq!(
            cookie,
            &format!(
                "session={}; Path=/; Domain=example.com; Expires=Mon, 04 Mar 2030 05:06:07 GMT; Secure; HttpOnly; SameSite=Strict",
                id
            )
        );
    }

    #[test]
    fn test_write_delete_cookie() {
        let mut headers = HeaderMap::new();
        codec().write_delete_cookie(&mut headers);

        let cookie = &set_cookies(&headers)[0];
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Path=/"));
    }

    #[test]
    fn test_same_site_enum() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }
}
