use std::fmt;
use std::io;

use crate::response::History;

/// Errors surfaced by this crate.
///
/// Redirect related errors carry the [`History`] of hops that completed
/// before the failure, so a caller can still inspect the intermediate
/// responses.
#[derive(Debug)]
pub enum Error {
    /// The url could not be understood.
    BadUrl(String),

    /// The url scheme is not one of `http`, `https`, `ws`, `wss` or `unix`.
    UnknownScheme(String),

    /// A request went to a non-TLS url while `enforce_tls` was set.
    Insecure(String),

    /// The requested url contradicts the host the connection was set up for.
    WrongHost {
        /// Host the connection verifies against.
        expected: String,
        /// Host the request asked for.
        actual: String,
    },

    /// A redirect status had a missing or unusable `Location` header.
    InvalidRedirect(History),

    /// The redirect target was rejected by the configured [`RedirectMode`][crate::RedirectMode].
    ForbiddenRedirect(History),

    /// The redirect hop limit was exhausted.
    TooManyRedirects(History),

    /// The pool has no endpoints left to connect to.
    NotFound(String),

    /// A wait was cancelled because the session or pool was shut down.
    Aborted,

    /// The server did not complete an `Upgrade` handshake (status code).
    FailedUpgrade(u16),

    /// Some unspecified `std::io::Error`.
    Io(io::Error),

    /// A malformed status line, header, cookie or date.
    Parse(String),

    /// TLS handshake or certificate verification failure.
    #[cfg(feature = "rustls")]
    Tls(rustls::Error),
}

impl Error {
    /// The redirect history collected before this error, if any.
    pub fn history(&self) -> Option<&History> {
        match self {
            Error::InvalidRedirect(h) => Some(h),
            Error::ForbiddenRedirect(h) => Some(h),
            Error::TooManyRedirects(h) => Some(h),
            _ => None,
        }
    }

    pub(crate) fn parse(what: impl Into<String>) -> Error {
        Error::Parse(what.into())
    }

    /// Convert to io::Error for use in `Read`/`Write` trait impls.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(e) => e,
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(feature = "rustls")]
impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Error {
        Error::Tls(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadUrl(url) => write!(f, "bad url: {}", url),
            Error::UnknownScheme(scheme) => write!(f, "unknown scheme: {}", scheme),
            Error::Insecure(url) => write!(f, "refusing non-TLS url: {}", url),
            Error::WrongHost { expected, actual } => {
                write!(f, "wrong host: connection is for {}, not {}", expected, actual)
            }
            Error::InvalidRedirect(_) => write!(f, "redirect without usable location"),
            Error::ForbiddenRedirect(_) => write!(f, "redirect forbidden by policy"),
            Error::TooManyRedirects(_) => write!(f, "too many redirects"),
            Error::NotFound(host) => write!(f, "no usable address for: {}", host),
            Error::Aborted => write!(f, "operation aborted"),
            Error::FailedUpgrade(status) => write!(f, "upgrade refused with status {}", status),
            Error::Io(err) => write!(f, "io: {}", err),
            Error::Parse(what) => write!(f, "parse: {}", what),
            #[cfg(feature = "rustls")]
            Error::Tls(err) => write!(f, "tls: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            #[cfg(feature = "rustls")]
            Error::Tls(e) => Some(e),
            _ => None,
        }
    }
}
