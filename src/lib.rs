#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![deny(missing_docs)]
//! A blocking HTTP/1.1 client with pooled connections, cookies and
//! redirect policies.
//!
//! The entry point is the [`Session`]: it keeps one connection pool per
//! origin (scheme, host, port), a cookie jar shared by all its requests
//! and the TLS trust configuration. Requests from any number of threads
//! are multiplexed onto the pooled connections; a connection is busy only
//! while a request is being written or its response body is being read.
//!
//! # Usage
//!
//! In its simplest form:
//!
//! ```no_run
//! let body: String = requests::get("http://example.com")
//!     .header("Example-Header", "header value")
//!     .call()?
//!     .into_string()?;
//! # Ok::<(), requests::Error>(())
//! ```
//!
//! The crate level functions run on a throwaway [`Session`]. Create your
//! own to get connection reuse and cookies:
//!
//! ```no_run
//! use requests::{RedirectMode, Session};
//!
//! let session = Session::builder()
//!     .max_redirects(5)
//!     .redirect(RedirectMode::PrivateDomain)
//!     .build();
//!
//! let response = session.get("http://example.com/login").call()?;
//! // cookies set by /login are sent here again:
//! let page = session.get("http://example.com/account").call()?;
//! # Ok::<(), requests::Error>(())
//! ```
//!
//! # Streaming
//!
//! [`RequestBuilder::call`] and the `send` variants buffer the whole
//! response body. [`Session::request_stream`] (and
//! [`RequestBuilder::stream`]) instead return a [`Stream`] that reads the
//! body incrementally while holding on to the connection, along with the
//! [`History`] of redirect hops that were followed on the way.
//!
//! # Bodies
//!
//! Request bodies are [`Source`] values: in-memory buffers, form pairs,
//! JSON, files, arbitrary readers or [`Multipart`] forms. Sized bodies are
//! sent with `Content-Length`, unsized ones chunked.
//!
//! # Redirects
//!
//! Redirects (301, 302, 303, 307, 308) are followed according to a
//! [`RedirectMode`] and a hop limit, and each followed hop is recorded.
//! The request method is never rewritten while following. Targets are
//! resolved against the current url, so relative `Location` values work.
//!
//! # Urls
//!
//! `http`, `https`, `ws`, `wss` and `unix` urls are understood. The
//! websocket schemes only cover the `Upgrade` handshake (see
//! [`Session::websocket`]); `unix` urls address a local stream socket by
//! path.
//!
//! # TLS
//!
//! With the default **rustls** feature, `https`/`wss` connections verify
//! the server against the configured roots (compiled-in webpki roots
//! unless overridden via [`tls::TlsConfig`]). Verification failures fail
//! the request; there is no opt-out short of the explicitly dangerous
//! one in the config.

#[macro_use]
extern crate log;

mod chunked;
mod config;
mod conn;
mod error;
mod multipart;
mod pool;
mod redirect;
mod request;
mod response;
mod run;
mod session;
mod stream;
mod transport;
mod upgrade;
mod util;

pub mod cookies;
pub mod resolver;
pub mod source;

#[cfg(feature = "rustls")]
pub mod tls;

#[cfg(test)]
mod test;
#[cfg(test)]
mod testserver;

pub use config::{RequestOptions, SessionConfig};
pub use cookies::{Cookie, CookieJar};
pub use error::Error;
pub use multipart::{Multipart, MultipartSource};
pub use redirect::RedirectMode;
pub use request::RequestBuilder;
pub use response::{History, HistoryEntry, Response, ResponseHeader};
pub use session::{Session, SessionBuilder};
pub use source::{IntoSource, Source};
pub use stream::Stream;
pub use upgrade::Upgraded;

/// Re-exported http crate for [`http::Method`], header types etc.
pub use http;

macro_rules! mk_method {
    ($f:tt, $m:tt) => {
        #[doc = concat!("Make a ", stringify!($m), " request.\n\nRuns on a one-shot [`Session`].")]
        #[must_use]
        pub fn $f(url: &str) -> RequestBuilder {
            Session::new().request(http::Method::$m, url)
        }
    };
}

mk_method!(get, GET);
mk_method!(post, POST);
mk_method!(put, PUT);
mk_method!(delete, DELETE);
mk_method!(head, HEAD);
mk_method!(options, OPTIONS);
mk_method!(patch, PATCH);
