use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{NaiveDateTime, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;

/// Cookie store for a single chat's portal session.
///
/// One jar serves one portal host, so domain and path scoping are ignored.
/// The snapshot is what gets persisted between requests.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
}

impl CookieJar {
    pub fn from_snapshot(snapshot: BTreeMap<String, String>) -> Self {
        Self {
            cookies: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Apply one `Set-Cookie` header value.
    fn apply(&self, header: &str) {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let value = value.trim().trim_matches('"');

        let expired = is_expired(parts, Utc::now().naive_utc());

        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        if expired || value.is_empty() || value == "deleted" {
            cookies.remove(name);
        } else {
            cookies.insert(name.to_string(), value.to_string());
        }
    }
}

/// `Expires` spellings seen in the wild (RFC 1123, RFC 850, Netscape).
const EXPIRES_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
];

fn parse_expires(value: &str) -> Option<NaiveDateTime> {
    EXPIRES_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value.trim(), fmt).ok())
}

/// Cookie attributes say the cookie is already gone. `Max-Age` wins over
/// `Expires`; an unreadable `Expires` keeps the cookie.
fn is_expired<'a>(attrs: impl Iterator<Item = &'a str>, now: NaiveDateTime) -> bool {
    let mut max_age = None;
    let mut expires = None;
    for attr in attrs {
        let Some((key, value)) = attr.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "max-age" => max_age = value.trim().parse::<i64>().ok(),
            "expires" => expires = parse_expires(value),
            _ => {}
        }
    }
    match (max_age, expires) {
        (Some(secs), _) => secs <= 0,
        (None, Some(at)) => at <= now,
        (None, None) => false,
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &Url) {
        for header in cookie_headers {
            if let Ok(raw) = header.to_str() {
                self.apply(raw);
            }
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        if cookies.is_empty() {
            return None;
        }
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://portal.test/dashboard").unwrap()
    }

    fn set(jar: &CookieJar, headers: &[&str]) {
        let values: Vec<HeaderValue> = headers
            .iter()
            .map(|h| HeaderValue::from_str(h).unwrap())
            .collect();
        jar.set_cookies(&mut values.iter(), &url());
    }

    #[test]
    fn test_collects_and_rotates() {
        let jar = CookieJar::default();
        set(&jar, &["XSRF-TOKEN=one; Path=/", "webcall_session=abc; Path=/; HttpOnly"]);
        set(&jar, &["XSRF-TOKEN=two; Path=/"]);

        let header = jar.cookies(&url()).unwrap();
        assert_eq!(header.to_str().unwrap(), "XSRF-TOKEN=two; webcall_session=abc");
    }

    #[test]
    fn test_expiry_attributes() {
        let now = NaiveDateTime::parse_from_str("2025-07-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let expired = |header: &str| is_expired(header.split(';'), now);

        assert!(expired("Path=/; Expires=Mon, 30 Jun 2025 08:00:00 GMT"));
        assert!(expired("Expires=Sunday, 29-Jun-25 08:00:00 GMT"));
        assert!(!expired("Path=/; Expires=Wed, 02-Jul-2025 08:00:00 GMT"));
        assert!(!expired("Path=/1970; HttpOnly"));
        assert!(!expired("Expires=Mon, 30 Jun 2025 08:00:00 GMT; Max-Age=3600"));
        assert!(expired("Max-Age=-1"));
        assert!(!expired("Expires=soon"));
    }

    #[test]
    fn test_expired_cookie_removed() {
        let jar = CookieJar::default();
        set(&jar, &["webcall_session=abc"]);
        set(&jar, &["webcall_session=deleted; expires=Thu, 01-Jan-1970 00:00:01 GMT; Max-Age=0"]);
        assert!(jar.is_empty());
        assert!(jar.cookies(&url()).is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let jar = CookieJar::default();
        set(&jar, &["a=1", "b=2"]);
        let restored = CookieJar::from_snapshot(jar.snapshot());
        assert_eq!(restored.snapshot(), jar.snapshot());
    }

    #[test]
    fn test_malformed_header_ignored() {
        let jar = CookieJar::default();
        set(&jar, &["no-equals-sign", "=orphan"]);
        assert!(jar.is_empty());
    }
}
