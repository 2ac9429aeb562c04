//! The [`Session`]: shared pools, cookie jar and TLS context.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use http::{HeaderMap, Method};
use url::Url;

#[cfg(feature = "rustls")]
use once_cell::sync::OnceCell;

use crate::config::{RequestOptions, SessionConfig};
use crate::conn::RequestParams;
use crate::cookies::{CookieJar, PublicSuffixList};
use crate::pool::ConnectionPool;
use crate::request::RequestBuilder;
use crate::resolver::{ArcResolver, Resolver};
use crate::response::History;
use crate::run;
use crate::source::IntoSource;
use crate::stream::Stream;
use crate::upgrade::Upgraded;
use crate::{Error, RedirectMode};

#[cfg(feature = "rustls")]
use crate::tls::TlsConfig;

/// The key a connection pool is looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Origin {
    scheme: SchemeKind,
    /// Lowercased host; the socket path for `unix` urls.
    host: String,
    port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SchemeKind {
    Http,
    Https,
    Wss,
    Unix,
}

impl Origin {
    pub fn of(url: &Url) -> Result<Origin, Error> {
        let scheme = match url.scheme() {
            "http" | "ws" => SchemeKind::Http,
            "https" => SchemeKind::Https,
            "wss" => SchemeKind::Wss,
            "unix" => {
                return Ok(Origin {
                    scheme: SchemeKind::Unix,
                    host: url.path().to_string(),
                    port: 0,
                })
            }
            other => return Err(Error::UnknownScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::BadUrl(format!("{} is missing a host", url)))?
            .to_ascii_lowercase();
        let port = url.port().unwrap_or_else(|| default_port(scheme));
        Ok(Origin { scheme, host, port })
    }

    fn is_secure(&self) -> bool {
        matches!(self.scheme, SchemeKind::Https | SchemeKind::Wss)
    }

    fn is_unix(&self) -> bool {
        self.scheme == SchemeKind::Unix
    }

    // the name a connection verifies against
    fn connect_host(&self) -> String {
        if self.is_unix() {
            "localhost".to_string()
        } else {
            self.host.clone()
        }
    }

    fn host_header(&self) -> String {
        if self.is_unix() {
            "localhost".to_string()
        } else if self.port == default_port(self.scheme) {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn default_port(scheme: SchemeKind) -> u16 {
    match scheme {
        SchemeKind::Http => 80,
        SchemeKind::Https | SchemeKind::Wss => 443,
        SchemeKind::Unix => 0,
    }
}

/// An HTTP client holding state between requests.
///
/// A session keeps one connection pool per origin, a cookie jar shared by
/// all its requests and the TLS trust configuration. It uses an inner
/// [`Arc`]: clones are cheap and share all state.
///
/// ```no_run
/// let session = requests::Session::new();
///
/// let body = session
///     .get("http://example.com/page")
///     .call()?
///     .into_string()?;
///
/// // reuses the connection from the previous request
/// let again = session.get("http://example.com/other").call()?;
/// # Ok::<(), requests::Error>(())
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    jar: CookieJar,
    psl: Option<Arc<PublicSuffixList>>,
    resolver: ArcResolver,
    pools: Mutex<HashMap<Origin, ConnectionPool>>,
    #[cfg(feature = "rustls")]
    tls_client: OnceCell<Arc<rustls::ClientConfig>>,
}

impl Session {
    /// A session with default configuration.
    pub fn new() -> Session {
        Session::builder().build()
    }

    /// Start configuring a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder {
            config: SessionConfig::default(),
            resolver: ArcResolver::default(),
            psl: None,
        }
    }

    /// The configuration this session runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The cookie jar shared by this session's requests.
    pub fn jar(&self) -> &CookieJar {
        &self.inner.jar
    }

    pub(crate) fn psl(&self) -> &PublicSuffixList {
        match &self.inner.psl {
            Some(psl) => psl,
            None => PublicSuffixList::shared(),
        }
    }

    /// Request by providing the HTTP verb.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    /// Make a GET request from this session.
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Make a POST request from this session.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Make a PUT request from this session.
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Make a DELETE request from this session.
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Make a HEAD request from this session.
    pub fn head(&self, url: &str) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Make an OPTIONS request from this session.
    pub fn options(&self, url: &str) -> RequestBuilder {
        self.request(Method::OPTIONS, url)
    }

    /// Make a PATCH request from this session.
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// The streaming entry point: returns the response as a [`Stream`]
    /// along with the redirect [`History`] that led to it.
    pub fn request_stream(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: impl IntoSource,
    ) -> Result<(Stream, History), Error> {
        let url = parse_url(url)?;
        let mut source = body.into_source();
        let opts = self.inner.config.options;
        run::request_stream(self, method, url, &headers, &opts, source.as_mut())
            .map(|(stream, history, _)| (stream, history))
    }

    /// Perform a websocket `Upgrade` handshake and hand back the raw
    /// byte stream. The frame protocol on top is left to the caller.
    pub fn websocket(&self, url: &str, mut headers: HeaderMap) -> Result<Upgraded, Error> {
        use http::header::{HeaderValue, CONNECTION, UPGRADE};

        let url = parse_url(url)?;
        let pool = self.get_pool(&url)?;
        let handle = pool.borrow_connection()?;

        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        if !headers.contains_key("sec-websocket-key") {
            let value = HeaderValue::from_str(&websocket_key()?)
                .map_err(|_| Error::parse("bad websocket key"))?;
            headers.insert("sec-websocket-key", value);
        }
        if !headers.contains_key("sec-websocket-version") {
            headers.insert("sec-websocket-version", HeaderValue::from_static("13"));
        }

        let target = run::encoded_resource(&url);
        let params = RequestParams {
            method: &Method::GET,
            target: &target,
            headers: &headers,
            jar: Some(self.jar()),
            psl: self.psl(),
            user_agent: self.inner.config.user_agent(),
        };
        handle.upgrade(&params)
    }

    /// Look up or create the connection pool for the url's origin.
    ///
    /// Pool creation resolves the host. The map lock is held across that,
    /// so concurrent callers for the same origin converge on one pool.
    pub(crate) fn get_pool(&self, url: &Url) -> Result<ConnectionPool, Error> {
        let origin = Origin::of(url)?;
        let mut pools = self.inner.pools.lock().unwrap();
        if let Some(pool) = pools.get(&origin) {
            return Ok(pool.clone());
        }

        let pool = self.make_pool(&origin)?;
        pools.insert(origin, pool.clone());
        Ok(pool)
    }

    fn make_pool(&self, origin: &Origin) -> Result<ConnectionPool, Error> {
        let secure = origin.is_secure();

        #[cfg(not(feature = "rustls"))]
        if secure {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "tls support is not compiled in (feature \"rustls\")",
            )));
        }

        #[cfg(feature = "rustls")]
        let tls: crate::conn::TlsContext = if secure {
            Some(self.tls_client())
        } else {
            None
        };
        #[cfg(not(feature = "rustls"))]
        let tls: crate::conn::TlsContext = ();

        let pool = ConnectionPool::new(
            origin.connect_host(),
            origin.host_header(),
            secure,
            self.inner.config.max_connections_per_origin,
            tls,
        );

        if origin.is_unix() {
            pool.lookup_unix(PathBuf::from(&origin.host));
        } else {
            pool.lookup(&*self.inner.resolver, origin.port)?;
        }
        Ok(pool)
    }

    #[cfg(feature = "rustls")]
    fn tls_client(&self) -> Arc<rustls::ClientConfig> {
        self.inner
            .tls_client
            .get_or_init(|| crate::tls::rustls::build_config(&self.inner.config.tls))
            .clone()
    }

    /// Shut the session down: evict all pools, tear down idle connections
    /// and wake any borrow waiters with [`Error::Aborted`]. In-flight
    /// exchanges finish; their connections are closed on return.
    pub fn close(&self) {
        let mut pools = self.inner.pools.lock().unwrap();
        for pool in pools.values() {
            pool.close();
        }
        pools.clear();
    }

    #[cfg(test)]
    pub(crate) fn pool_count(&self) -> usize {
        self.inner.pools.lock().unwrap().len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.inner.config)
            .field("pools", &self.inner.pools.lock().unwrap().len())
            .finish()
    }
}

fn parse_url(input: &str) -> Result<Url, Error> {
    Url::parse(input).map_err(|_| Error::BadUrl(input.to_string()))
}

fn websocket_key() -> Result<String, Error> {
    use base64::prelude::{Engine as _, BASE64_STANDARD};

    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Builder for a configured [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    resolver: ArcResolver,
    psl: Option<Arc<PublicSuffixList>>,
}

impl SessionBuilder {
    /// The `User-Agent` sent when requests do not set their own.
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.config.user_agent = value.into();
        self
    }

    /// Maximum concurrent connections per origin. Further requests wait.
    pub fn max_connections_per_origin(mut self, max: usize) -> Self {
        self.config.max_connections_per_origin = max;
        self
    }

    /// Default redirect policy for requests of this session.
    pub fn redirect(mut self, mode: RedirectMode) -> Self {
        self.config.options.redirect = mode;
        self
    }

    /// Default redirect hop limit.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.options.max_redirects = max;
        self
    }

    /// Refuse requests to non-TLS urls.
    pub fn enforce_tls(mut self, enforce: bool) -> Self {
        self.config.options.enforce_tls = enforce;
        self
    }

    /// Replace all default request options at once.
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Configure a custom name resolver, e.g. for tests or DNS-based
    /// load balancing.
    pub fn resolver(mut self, resolver: impl Resolver) -> Self {
        self.resolver = resolver.into();
        self
    }

    /// Use a custom public suffix list for cookie domain checks and the
    /// [`RedirectMode::PrivateDomain`] policy.
    pub fn public_suffixes(mut self, psl: PublicSuffixList) -> Self {
        self.psl = Some(Arc::new(psl));
        self
    }

    /// TLS settings for `https` and `wss` connections.
    #[cfg(feature = "rustls")]
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.config.tls = tls;
        self
    }

    /// Create the session.
    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                config: self.config,
                jar: CookieJar::new(),
                psl: self.psl,
                resolver: self.resolver,
                pools: Mutex::new(HashMap::new()),
                #[cfg(feature = "rustls")]
                tls_client: OnceCell::new(),
            }),
        }
    }
}
