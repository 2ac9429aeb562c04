//! Session and request configuration.

use std::fmt;

use crate::RedirectMode;

#[cfg(feature = "rustls")]
use crate::tls::TlsConfig;

/// Per-request policy knobs.
///
/// A session carries defaults for these; every request can override them
/// through the [`RequestBuilder`][crate::RequestBuilder].
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Refuse to send requests to non-TLS urls.
    pub enforce_tls: bool,
    /// Which redirect targets may be followed.
    pub redirect: RedirectMode,
    /// Upper bound on redirect hops for one request.
    pub max_redirects: u32,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            enforce_tls: false,
            redirect: RedirectMode::default(),
            max_redirects: 10,
        }
    }
}

/// Configuration of a [`Session`][crate::Session].
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) user_agent: String,
    pub(crate) max_connections_per_origin: usize,
    pub(crate) options: RequestOptions,
    #[cfg(feature = "rustls")]
    pub(crate) tls: TlsConfig,
}

impl SessionConfig {
    /// The `User-Agent` sent when a request does not set one.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Maximum number of concurrent connections per origin. Requests
    /// beyond this wait for a connection to come back to the pool.
    pub fn max_connections_per_origin(&self) -> usize {
        self.max_connections_per_origin
    }

    /// Default options applied to every request of the session.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// TLS settings used by `https` and `wss` connections.
    #[cfg(feature = "rustls")]
    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            user_agent: format!("Requests-{}", env!("CARGO_PKG_VERSION")),
            max_connections_per_origin: 6,
            options: RequestOptions::default(),
            #[cfg(feature = "rustls")]
            tls: TlsConfig::default(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut d = f.debug_struct("SessionConfig");
        d.field("user_agent", &self.user_agent)
            .field("max_connections_per_origin", &self.max_connections_per_origin)
            .field("options", &self.options);
        #[cfg(feature = "rustls")]
        d.field("tls", &self.tls);
        d.finish()
    }
}
