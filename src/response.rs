//! Response head parsing and the buffered [`Response`] type.

use std::fmt;
use std::io::Write;
use std::ops::Deref;
use std::path::Path;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};
use serde::de::DeserializeOwned;
use url::Url;

use crate::Error;

/// The parsed head of an HTTP response: status line and header fields.
///
/// Header fields keep their arrival order and duplicates.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl ResponseHeader {
    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The HTTP version of the status line.
    pub fn version(&self) -> Version {
        self.version
    }

    /// All header fields.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of the named header, if present and valid utf-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of the named header.
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Whether the status is one the redirect loop acts on.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.as_u16(), 301 | 302 | 303 | 307 | 308)
    }

    /// The media type part of `Content-Type`, without parameters.
    ///
    /// `text/html; charset=utf-8` comes back as `text/html`.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    pub(crate) fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    pub(crate) fn is_connection_close(&self) -> bool {
        self.header("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

/// Index just past the `\r\n\r\n` that terminates a response head.
pub(crate) fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a complete response head (including the final empty line).
pub(crate) fn parse_head(head: &[u8]) -> Result<ResponseHeader, Error> {
    let mut lines = split_crlf(head);

    let status_line = lines
        .next()
        .ok_or_else(|| Error::parse("empty response head"))?;
    let status_line = std::str::from_utf8(status_line)
        .map_err(|_| Error::parse("status line is not ascii"))?;

    let mut split = status_line.splitn(3, ' ');
    let version = match split.next() {
        Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/1.0") => Version::HTTP_10,
        Some(other) => return Err(Error::parse(format!("bad http version: {}", other))),
        None => return Err(Error::parse("bad status line")),
    };
    let status = split
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| Error::parse(format!("bad status line: {}", status_line)))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| Error::parse("header line without colon"))?;
        let name = HeaderName::from_bytes(&line[..colon])
            .map_err(|_| Error::parse("bad header name"))?;
        let mut value = &line[colon + 1..];
        while value.first() == Some(&b' ') || value.first() == Some(&b'\t') {
            value = &value[1..];
        }
        let value =
            HeaderValue::from_bytes(value).map_err(|_| Error::parse("bad header value"))?;
        headers.append(name, value);
    }

    Ok(ResponseHeader {
        status,
        version,
        headers,
    })
}

fn split_crlf(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    buf.split(|b| *b == b'\n').map(|line| {
        if line.last() == Some(&b'\r') {
            &line[..line.len() - 1]
        } else {
            line
        }
    })
}

/// One hop of a followed redirect: its head and drained body.
#[derive(Debug)]
pub struct HistoryEntry {
    header: ResponseHeader,
    body: Vec<u8>,
}

impl HistoryEntry {
    pub(crate) fn new(header: ResponseHeader, body: Vec<u8>) -> Self {
        HistoryEntry { header, body }
    }

    /// The head of this intermediate response.
    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// The drained body of this intermediate response.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// The redirect hops traversed before a response.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub(crate) fn new() -> Self {
        History::default()
    }

    pub(crate) fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }
}

impl Deref for History {
    type Target = [HistoryEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

/// A fully buffered response, as returned by the convenience call paths.
pub struct Response {
    header: ResponseHeader,
    body: Vec<u8>,
    history: History,
    url: Url,
}

impl Response {
    pub(crate) fn new(header: ResponseHeader, body: Vec<u8>, history: History, url: Url) -> Self {
        Response {
            header,
            body,
            history,
            url,
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.header.status()
    }

    /// The response head.
    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    /// All header fields.
    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// First value of the named header.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.header.header(name)
    }

    /// The url that produced this response, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The redirect hops traversed to get here.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the body bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    /// The body as utf-8 text.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.body).map_err(|_| Error::parse("body is not utf-8"))
    }

    /// Deserialize the body as JSON.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::parse(format!("json: {}", e)))
    }

    /// Write the body to `w`, returning the number of bytes written.
    pub fn write_to(&self, mut w: impl Write) -> Result<u64, Error> {
        w.write_all(&self.body)?;
        Ok(self.body.len() as u64)
    }

    /// Save the body to a file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<u64, Error> {
        let file = std::fs::File::create(path)?;
        self.write_to(file)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.header.status())
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .field("history", &self.history.len())
            .finish()
    }
}
