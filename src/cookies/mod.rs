//! Cookie storage per RFC 6265.
//!
//! The jar is shared by all requests of a [`Session`][crate::Session]: it is
//! consulted before each request goes out and updated from each response's
//! `Set-Cookie` headers. All operations lock internally, so a jar can be
//! used from any thread.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod date;
mod parse;
mod psl;

pub use date::parse_http_date;
pub use parse::{parse_set_cookie, SetCookie};
pub use psl::PublicSuffixList;

/// A single stored cookie.
#[derive(Debug, Clone)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    path: String,
    // None = session cookie, lives until the jar is dropped
    expiry_time: Option<SystemTime>,
    creation_time: SystemTime,
    last_access_time: SystemTime,
    persistent: bool,
    host_only: bool,
    secure_only: bool,
    http_only: bool,
}

impl Cookie {
    /// Cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The domain this cookie is scoped to (lowercased).
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The path this cookie is scoped to. Always begins with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// When the cookie expires. `None` for session cookies.
    pub fn expiry_time(&self) -> Option<SystemTime> {
        self.expiry_time
    }

    /// When the cookie was first stored. Survives replacement by an
    /// equally keyed cookie.
    pub fn creation_time(&self) -> SystemTime {
        self.creation_time
    }

    /// When the cookie was last sent.
    pub fn last_access_time(&self) -> SystemTime {
        self.last_access_time
    }

    /// Whether the cookie outlives the session (had `Expires`/`Max-Age`).
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Whether the cookie only matches the exact host that set it.
    pub fn is_host_only(&self) -> bool {
        self.host_only
    }

    /// Whether the cookie is only sent on TLS requests.
    pub fn is_secure_only(&self) -> bool {
        self.secure_only
    }

    /// Whether the cookie is shielded from non-HTTP access.
    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        match self.expiry_time {
            Some(at) => at <= now,
            None => false,
        }
    }
}

/// `domain_match` of RFC 6265 §5.1.3. Inputs must be lowercased.
pub fn domain_match(full: &str, pattern: &str) -> bool {
    if full == pattern {
        return true;
    }
    full.ends_with(pattern)
        && full.as_bytes()[full.len() - pattern.len() - 1] == b'.'
        && !pattern.starts_with('.')
}

/// `path_match` of RFC 6265 §5.1.4. Inputs must be lowercased.
pub fn path_match(full: &str, pattern: &str) -> bool {
    if full == pattern {
        return true;
    }
    full.starts_with(pattern)
        && (pattern.ends_with('/') || full.as_bytes()[pattern.len()] == b'/')
}

// uniqueness key: (name, domain, path)
type Key = (String, String, String);

/// Shared cookie storage.
#[derive(Debug, Default)]
pub struct CookieJar {
    content: Mutex<BTreeMap<Key, Cookie>>,
}

impl CookieJar {
    /// An empty jar.
    pub fn new() -> Self {
        CookieJar::default()
    }

    /// Apply the storage rules of RFC 6265 §5.3 to a parsed `Set-Cookie`.
    ///
    /// `request_host` is the (lowercased) host the response came from,
    /// `request_path` the path of the request that triggered it.
    /// `from_non_http_api` marks calls arriving through a non-HTTP channel;
    /// those may neither create nor replace `HttpOnly` cookies.
    ///
    /// Returns whether the cookie was stored.
    pub fn set(
        &self,
        sc: &SetCookie,
        request_host: &str,
        from_non_http_api: bool,
        request_path: &str,
        public_suffixes: &PublicSuffixList,
    ) -> bool {
        let now = SystemTime::now();
        let request_host = request_host.to_ascii_lowercase();

        let (expiry_time, persistent) = if let Some(max_age) = sc.max_age {
            let at = if max_age <= 0 {
                UNIX_EPOCH
            } else {
                now + Duration::from_secs(max_age as u64)
            };
            (Some(at), true)
        } else if let Some(at) = sc.expires {
            (Some(at), true)
        } else {
            (None, false)
        };

        let (domain, host_only) = if sc.domain.is_empty() {
            (request_host.clone(), true)
        } else if public_suffixes.is_public_suffix(&sc.domain) {
            // only the suffix itself may set such a cookie, as host-only
            if request_host != sc.domain {
                return false;
            }
            (request_host.clone(), true)
        } else if !domain_match(&request_host, &sc.domain) {
            return false;
        } else {
            (sc.domain.clone(), false)
        };

        let path = if sc.path.starts_with('/') {
            sc.path.clone()
        } else {
            default_path(request_path)
        };

        if sc.http_only && from_non_http_api {
            return false;
        }

        let mut cookie = Cookie {
            name: sc.name.clone(),
            value: sc.value.clone(),
            domain,
            path,
            expiry_time,
            creation_time: now,
            last_access_time: now,
            persistent,
            host_only,
            secure_only: sc.secure,
            http_only: sc.http_only,
        };

        let key = (
            cookie.name.clone(),
            cookie.domain.clone(),
            cookie.path.clone(),
        );

        let mut content = self.content.lock().unwrap();
        if let Some(old) = content.get(&key) {
            if old.http_only && from_non_http_api {
                return false;
            }
            cookie.creation_time = old.creation_time;
        }
        content.insert(key, cookie);
        true
    }

    /// The `Cookie:` header value for a request, or the empty string.
    ///
    /// Matching cookies are serialized `name=value` pairs joined by `"; "`,
    /// longest path first, then by creation time.
    pub fn get(&self, request_host: &str, is_secure: bool, request_path: &str) -> String {
        let now = SystemTime::now();
        let request_host = request_host.to_ascii_lowercase();

        let mut content = self.content.lock().unwrap();
        let mut matched: Vec<&mut Cookie> = content
            .values_mut()
            .filter(|c| {
                !c.is_expired(now)
                    && (is_secure || !c.secure_only)
                    && if c.host_only {
                        request_host == c.domain
                    } else {
                        domain_match(&request_host, &c.domain)
                    }
                    && path_match(request_path, &c.path)
            })
            .collect();

        matched.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then(a.creation_time.cmp(&b.creation_time))
        });

        let mut header = String::new();
        for cookie in matched {
            cookie.last_access_time = now;
            if !header.is_empty() {
                header.push_str("; ");
            }
            header.push_str(&cookie.name);
            header.push('=');
            header.push_str(&cookie.value);
        }
        header
    }

    /// Remove expired cookies.
    pub fn drop_expired(&self) {
        let now = SystemTime::now();
        let mut content = self.content.lock().unwrap();
        content.retain(|_, c| !c.is_expired(now));
    }

    /// Number of stored cookies, expired ones included until collected.
    pub fn len(&self) -> usize {
        self.content.lock().unwrap().len()
    }

    /// Whether the jar holds no cookies.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored cookies, for inspection.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.content.lock().unwrap().values().cloned().collect()
    }
}

// RFC 6265 §5.1.4: everything up to but not including the last "/", or "/"
fn default_path(request_path: &str) -> String {
    if !request_path.starts_with('/') {
        return "/".to_string();
    }
    match request_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => request_path[..idx].to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn set(jar: &CookieJar, header: &str, host: &str, path: &str) -> bool {
        let sc = parse_set_cookie(header).unwrap();
        jar.set(&sc, host, false, path, PublicSuffixList::shared())
    }

    #[test]
    fn domain_match_cases() {
        assert!(domain_match("example.com", "example.com"));
        assert!(domain_match("a.b.com", "b.com"));
        assert!(!domain_match("abb.com", "b.com"));
        assert!(!domain_match("a.b.com", ".b.com"));
        assert!(!domain_match("com", "b.com"));
    }

    #[test]
    fn path_match_cases() {
        assert!(path_match("/a/b", "/a"));
        assert!(path_match("/a/b", "/a/"));
        assert!(path_match("/a", "/a"));
        assert!(!path_match("/ab", "/a"));
        assert!(!path_match("/", "/a"));
    }

    #[test]
    fn store_and_send_back() {
        let jar = CookieJar::new();
        assert!(set(&jar, "k=v; Path=/", "example.com", "/"));
        assert_eq!(jar.get("example.com", false, "/"), "k=v");
        assert_eq!(jar.get("example.com", false, "/sub/page"), "k=v");
        assert_eq!(jar.get("other.com", false, "/"), "");
    }

    #[test]
    fn round_trip_reparses() {
        let jar = CookieJar::new();
        assert!(set(&jar, "id=a3fWa; Path=/", "example.com", "/"));
        let header = jar.get("example.com", false, "/");
        // what we would send re-parses to the same pair
        let again = parse_set_cookie(&header).unwrap();
        assert_eq!(again.name, "id");
        assert_eq!(again.value, "a3fWa");
    }

    #[test]
    fn host_only_unless_domain_given() {
        let jar = CookieJar::new();
        assert!(set(&jar, "a=1", "www.example.com", "/"));
        // no Domain attribute: subdomains and parent do not match
        assert_eq!(jar.get("example.com", false, "/"), "");
        assert_eq!(jar.get("www.example.com", false, "/"), "a=1");

        assert!(set(&jar, "b=2; Domain=example.com", "www.example.com", "/"));
        assert_eq!(jar.get("example.com", false, "/"), "b=2");
        assert_eq!(jar.get("deep.www.example.com", false, "/"), "b=2");
    }

    #[test]
    fn wrong_domain_is_rejected() {
        let jar = CookieJar::new();
        assert!(!set(&jar, "a=1; Domain=other.com", "example.com", "/"));
        assert!(!set(&jar, "a=1; Domain=www.example.com", "example.com", "/"));
        assert!(jar.is_empty());
    }

    #[test]
    fn public_suffix_is_rejected() {
        let jar = CookieJar::new();
        assert!(!set(&jar, "a=1; Domain=com", "example.com", "/"));
        assert!(!set(&jar, "a=1; Domain=co.uk", "shop.co.uk", "/"));
        // unless the request host is the suffix itself
        assert!(set(&jar, "a=1; Domain=co.uk", "co.uk", "/"));
        let c = &jar.cookies()[0];
        assert!(c.is_host_only());
    }

    #[test]
    fn secure_cookies_stay_on_tls() {
        let jar = CookieJar::new();
        assert!(set(&jar, "s=1; Secure; Path=/", "example.com", "/"));
        assert_eq!(jar.get("example.com", false, "/"), "");
        assert_eq!(jar.get("example.com", true, "/"), "s=1");
    }

    #[test]
    fn http_only_guard() {
        let jar = CookieJar::new();
        let sc = parse_set_cookie("h=1; HttpOnly; Path=/").unwrap();
        // a non-http caller cannot create it
        assert!(!jar.set(&sc, "example.com", true, "/", PublicSuffixList::shared()));
        // the http path can
        assert!(jar.set(&sc, "example.com", false, "/", PublicSuffixList::shared()));
        // and a non-http caller cannot replace it
        let sc2 = parse_set_cookie("h=2; Path=/").unwrap();
        assert!(!jar.set(&sc2, "example.com", true, "/", PublicSuffixList::shared()));
        assert_eq!(jar.get("example.com", false, "/"), "h=1");
    }

    #[test]
    fn max_age_zero_deletes() {
        let jar = CookieJar::new();
        assert!(set(&jar, "k=v; Path=/", "example.com", "/"));
        assert_eq!(jar.get("example.com", false, "/"), "k=v");

        assert!(set(&jar, "k=gone; Path=/; Max-Age=0", "example.com", "/"));
        assert_eq!(jar.get("example.com", false, "/"), "");

        jar.drop_expired();
        assert!(jar.is_empty());
    }

    #[test]
    fn creation_time_survives_replacement() {
        let jar = CookieJar::new();
        assert!(set(&jar, "k=1; Path=/", "example.com", "/"));
        let created = jar.cookies()[0].creation_time();

        thread::sleep(Duration::from_millis(20));
        assert!(set(&jar, "k=2; Path=/", "example.com", "/"));

        let cookies = jar.cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value(), "2");
        assert_eq!(cookies[0].creation_time(), created);
    }

    #[test]
    fn default_path_from_request() {
        let jar = CookieJar::new();
        assert!(set(&jar, "k=v", "example.com", "/a/b/c"));
        assert_eq!(jar.cookies()[0].path(), "/a/b");

        let jar = CookieJar::new();
        assert!(set(&jar, "k=v", "example.com", "/top"));
        assert_eq!(jar.cookies()[0].path(), "/");

        let jar = CookieJar::new();
        assert!(set(&jar, "k=v", "example.com", ""));
        assert_eq!(jar.cookies()[0].path(), "/");
    }

    #[test]
    fn longest_path_first() {
        let jar = CookieJar::new();
        assert!(set(&jar, "outer=1; Path=/", "example.com", "/"));
        thread::sleep(Duration::from_millis(5));
        assert!(set(&jar, "inner=2; Path=/a/b", "example.com", "/"));
        thread::sleep(Duration::from_millis(5));
        assert!(set(&jar, "outer2=3; Path=/", "example.com", "/"));

        assert_eq!(jar.get("example.com", false, "/a/b"), "inner=2; outer=1; outer2=3");
    }

    #[test]
    fn session_cookie_has_no_expiry() {
        let jar = CookieJar::new();
        assert!(set(&jar, "k=v", "example.com", "/"));
        let c = &jar.cookies()[0];
        assert_eq!(c.expiry_time(), None);
        assert!(!c.is_persistent());
    }
}
