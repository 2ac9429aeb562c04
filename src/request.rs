//! Building and sending individual requests.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use url::Url;

use crate::config::RequestOptions;
use crate::response::{History, Response};
use crate::session::Session;
use crate::source::{Empty, Form, IntoSource, Json};
use crate::stream::Stream;
use crate::{Error, RedirectMode};

/// One request in the making.
///
/// Created through the verb methods on [`Session`] (or the crate level
/// shortcuts). Collects headers and per-request policy overrides, then
/// executes via [`call()`][RequestBuilder::call] or one of the `send`
/// variants.
///
/// ```no_run
/// let session = requests::Session::new();
/// let response = session
///     .post("http://example.com/echo")
///     .header("Test", "dummy")
///     .send("test-data")?;
/// # Ok::<(), requests::Error>(())
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    session: Session,
    method: Method,
    url: Option<Url>,
    raw_url: String,
    headers: HeaderMap,
    opts: RequestOptions,
    error: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(session: Session, method: Method, url: &str) -> RequestBuilder {
        let opts = session.config().options;
        RequestBuilder {
            session,
            method,
            url: Url::parse(url).ok(),
            raw_url: url.to_string(),
            headers: HeaderMap::new(),
            opts,
            error: None,
        }
    }

    /// Add a header to this request.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                if self.error.is_none() {
                    self.error = Some(Error::parse(format!("bad header: {}: {}", name, value)));
                }
            }
        }
        self
    }

    /// Append a query parameter to the url.
    pub fn query(mut self, name: &str, value: &str) -> Self {
        if let Some(url) = &mut self.url {
            url.query_pairs_mut().append_pair(name, value);
        }
        self
    }

    /// `Authorization: Basic` credentials for this request.
    pub fn auth_basic(self, username: &str, password: &str) -> Self {
        let value = basic_auth(username, password);
        self.header("authorization", &value)
    }

    /// `Authorization: Bearer` token for this request.
    pub fn auth_bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    /// Override the session's redirect policy for this request.
    pub fn redirect(mut self, mode: RedirectMode) -> Self {
        self.opts.redirect = mode;
        self
    }

    /// Override the session's redirect hop limit for this request.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.opts.max_redirects = max;
        self
    }

    /// Refuse to send this request over a non-TLS transport.
    pub fn enforce_tls(mut self, enforce: bool) -> Self {
        self.opts.enforce_tls = enforce;
        self
    }

    /// Send without a body and buffer the response.
    pub fn call(self) -> Result<Response, Error> {
        self.do_send(Box::new(Empty))
    }

    /// Send with the given body and buffer the response.
    pub fn send(self, body: impl IntoSource) -> Result<Response, Error> {
        self.do_send(body.into_source())
    }

    /// Send key/value pairs as an `application/x-www-form-urlencoded` body.
    pub fn send_form<K: AsRef<str>, V: AsRef<str>>(
        self,
        pairs: &[(K, V)],
    ) -> Result<Response, Error> {
        self.do_send(Box::new(Form::new(pairs)))
    }

    /// Send a value serialized as an `application/json` body.
    pub fn send_json(self, value: &impl Serialize) -> Result<Response, Error> {
        let json = Json::new(value)?;
        self.do_send(Box::new(json))
    }

    /// Send and stream the response instead of buffering it.
    pub fn stream(self, body: impl IntoSource) -> Result<(Stream, History), Error> {
        let (session, method, url, headers, opts) = self.into_parts()?;
        let mut source = body.into_source();
        crate::run::request_stream(&session, method, url, &headers, &opts, source.as_mut())
            .map(|(stream, history, _)| (stream, history))
    }

    fn do_send(self, mut source: Box<dyn crate::source::Source>) -> Result<Response, Error> {
        let (session, method, url, headers, opts) = self.into_parts()?;
        crate::run::request_buffered(&session, method, url, &headers, &opts, source.as_mut())
    }

    fn into_parts(self) -> Result<(Session, Method, Url, HeaderMap, RequestOptions), Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let url = self.url.ok_or(Error::BadUrl(self.raw_url))?;
        Ok((self.session, self.method, url, self.headers, self.opts))
    }
}

/// The value for basic authorization: `base64("user:pass")`.
pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    // a colon in the user name would smuggle in a different split
    let safe = match username.find(':') {
        Some(idx) => &username[..idx],
        None => username,
    };
    format!(
        "Basic {}",
        BASE64_STANDARD.encode(format!("{}:{}", safe, password))
    )
}
