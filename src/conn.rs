//! A single-host HTTP/1.1 connection.
//!
//! One connection serializes traffic with two independent locks: the write
//! side admits one request at a time, the read side one response. A request
//! takes the write lock, sends its bytes, then takes the read lock *before*
//! giving up the write lock. That ordering pins responses to requests even
//! when several callers share the connection, while still letting the next
//! request start writing while the previous response body is being read.
//!
//! The read lock travels with the returned [`Stream`]: it is held until the
//! body is drained or dumped.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, TRANSFER_ENCODING, USER_AGENT};
use http::Method;

use crate::cookies::{parse_set_cookie, CookieJar, PublicSuffixList};
use crate::pool::ConnectionPool;
use crate::response::{self, ResponseHeader};
use crate::source::Source;
use crate::stream::{RawBody, Stream};
use crate::transport::{self, Endpoint, ReadHalf, WriteHalf};
use crate::upgrade::Upgraded;
use crate::util::Gate;
use crate::{chunked, Error};

/// The built TLS client configuration shared by a session's connections.
/// Collapses to nothing when TLS support is compiled out.
#[cfg(feature = "rustls")]
pub(crate) type TlsContext = Option<Arc<rustls::ClientConfig>>;
#[cfg(not(feature = "rustls"))]
pub(crate) type TlsContext = ();

/// Reuse ceiling applied when a response carries neither `Keep-Alive` nor
/// `Connection: close`: idle connections are retired after this long.
pub(crate) const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Requests served per connection when the server does not state a `max`.
pub(crate) const DEFAULT_KEEP_ALIVE_MAX: u64 = 100;

const MAX_HEAD_SIZE: usize = 64 * 1024;
const BODY_CHUNK: usize = 16 * 1024;

/// Everything a request needs besides the body source.
pub(crate) struct RequestParams<'a> {
    pub method: &'a Method,
    /// Encoded path plus query, e.g. `/search?q=x`.
    pub target: &'a str,
    pub headers: &'a HeaderMap,
    pub jar: Option<&'a CookieJar>,
    pub psl: &'a PublicSuffixList,
    pub user_agent: &'a str,
}

pub(crate) struct Connection {
    /// Verification / SNI host name.
    host: String,
    /// Value for the `Host` header (may carry a port).
    host_header: String,
    secure: bool,
    endpoint: Mutex<Endpoint>,
    write_gate: Gate,
    read_gate: Gate,
    write_half: Mutex<Option<WriteHalf>>,
    read_half: Mutex<Option<ReadHalf>>,
    state: Mutex<ConnState>,
    tls: TlsContext,
}

struct ConnState {
    open: bool,
    broken: bool,
    close_after: bool,
    keep_alive_until: Instant,
    remaining_requests: u64,
}

impl Connection {
    pub fn new(
        host: String,
        host_header: String,
        secure: bool,
        endpoint: Endpoint,
        tls: TlsContext,
    ) -> Connection {
        Connection {
            host,
            host_header,
            secure,
            endpoint: Mutex::new(endpoint),
            write_gate: Gate::new(),
            read_gate: Gate::new(),
            write_half: Mutex::new(None),
            read_half: Mutex::new(None),
            state: Mutex::new(ConnState {
                open: false,
                broken: false,
                close_after: false,
                keep_alive_until: Instant::now() + DEFAULT_KEEP_ALIVE,
                remaining_requests: DEFAULT_KEEP_ALIVE_MAX,
            }),
            tls,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.lock().unwrap().clone()
    }

    /// Whether another request may go over this connection.
    pub fn is_reusable(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.open
            && !state.broken
            && !state.close_after
            && state.remaining_requests > 0
            && state.keep_alive_until > Instant::now()
    }

    pub fn mark_broken(&self) {
        self.state.lock().unwrap().broken = true;
    }

    /// Best effort teardown of the transport. Gates are not touched.
    pub fn close_quiet(&self) {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        drop(state);

        self.read_half.lock().unwrap().take();
        if let Some(mut write) = self.write_half.lock().unwrap().take() {
            write.close();
        }
    }

    // Establish the transport. Caller holds both gates.
    fn connect_locked(&self, pool: Option<&ConnectionPool>) -> Result<(), Error> {
        loop {
            let endpoint = self.endpoint.lock().unwrap().clone();
            debug!("connect {} ({})", self.host, endpoint);

            match self.connect_endpoint(&endpoint) {
                Ok((read, write)) => {
                    *self.read_half.lock().unwrap() = Some(read);
                    *self.write_half.lock().unwrap() = Some(write);

                    let mut state = self.state.lock().unwrap();
                    state.open = true;
                    state.broken = false;
                    state.close_after = false;
                    state.keep_alive_until = Instant::now() + DEFAULT_KEEP_ALIVE;
                    state.remaining_requests = DEFAULT_KEEP_ALIVE_MAX;
                    return Ok(());
                }
                Err(e) => {
                    warn!("connect {} failed: {}", endpoint, e);
                    // a dead address is dropped from the pool, the next
                    // candidate gets its chance
                    let pool = match pool {
                        Some(p) => p,
                        None => return Err(e),
                    };
                    pool.discard_endpoint(&endpoint);
                    match pool.pick_endpoint() {
                        Some(next) => *self.endpoint.lock().unwrap() = next,
                        None => return Err(Error::NotFound(self.host.clone())),
                    }
                }
            }
        }
    }

    fn connect_endpoint(&self, endpoint: &Endpoint) -> Result<(ReadHalf, WriteHalf), Error> {
        if !self.secure {
            return Ok(transport::connect_plain(endpoint)?);
        }

        let addr = match endpoint {
            Endpoint::Tcp(addr) => addr,
            Endpoint::Unix(_) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "tls over unix sockets is not supported",
                )))
            }
        };

        #[cfg(feature = "rustls")]
        {
            let config = self
                .tls
                .as_ref()
                .expect("tls config for secure connection")
                .clone();
            let sock = transport::connect_tcp(addr)?;
            let (read, write) = crate::tls::rustls::wrap(sock, &self.host, config)?;
            return Ok((ReadHalf::Tls(read), WriteHalf::Tls(write)));
        }

        #[cfg(not(feature = "rustls"))]
        {
            let _ = addr;
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "tls support is not compiled in (feature \"rustls\")",
            )));
        }
    }

    // Close and re-establish. Caller holds the write gate; the read gate is
    // taken for the duration since a TLS handshake uses both directions.
    fn reconnect(&self, pool: Option<&ConnectionPool>) -> Result<(), Error> {
        self.read_gate.lock()?;
        let result = (|| {
            self.close_quiet();
            self.connect_locked(pool)
        })();
        self.read_gate.unlock();
        result
    }

    fn needs_reconnect(&self) -> bool {
        let state = self.state.lock().unwrap();
        !state.open
            || state.broken
            || state.close_after
            || state.remaining_requests == 0
            || state.keep_alive_until <= Instant::now()
    }

    fn write_request(
        &self,
        head: &[u8],
        source: &mut dyn Source,
        chunked_body: bool,
    ) -> io::Result<()> {
        let mut guard = self.write_half.lock().unwrap();
        let write = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;

        write.write_all(head)?;

        let mut buf = [0u8; BODY_CHUNK];
        loop {
            let (n, more) = source.read_some(&mut buf)?;
            if chunked_body {
                chunked::write_chunk(write, &buf[..n])?;
            } else if n > 0 {
                write.write_all(&buf[..n])?;
            }
            if !more {
                break;
            }
        }
        if chunked_body {
            chunked::write_final_chunk(write)?;
        }
        write.flush()
    }

    // Read the response head, leaving any body bytes that arrived with it
    // in the returned prefix.
    fn read_response_head(&self) -> Result<(ResponseHeader, Vec<u8>), Error> {
        let mut guard = self.read_half.lock().unwrap();
        let read = guard
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "connection closed")))?;

        let mut buf = Vec::with_capacity(4096);
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(end) = response::find_head_end(&buf) {
                let header = response::parse_head(&buf[..end])?;
                return Ok((header, buf[end..].to_vec()));
            }
            if buf.len() > MAX_HEAD_SIZE {
                return Err(Error::parse("response head too large"));
            }
            let n = read.read(&mut tmp)?;
            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before response head",
                )));
            }
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    pub(crate) fn read_body(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.read_half.lock().unwrap();
        match guard.as_mut() {
            Some(read) => read.read(buf),
            None => Ok(0),
        }
    }

    pub(crate) fn unlock_read(&self) {
        self.read_gate.unlock();
    }

    // Keep-alive bookkeeping after a response head arrived.
    fn note_response(&self, header: &ResponseHeader) {
        let mut state = self.state.lock().unwrap();
        state.remaining_requests = state.remaining_requests.saturating_sub(1);

        // http/1.0 closes unless it asks to keep the connection
        let explicit_keep_alive = header
            .header("connection")
            .map(|v| v.eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(false);
        let implied_close =
            header.version() == http::Version::HTTP_10 && !explicit_keep_alive;

        if header.is_connection_close() || implied_close {
            state.close_after = true;
            return;
        }

        match header.header("keep-alive").map(parse_keep_alive) {
            Some(ka) => {
                let timeout = ka.timeout.unwrap_or(DEFAULT_KEEP_ALIVE);
                state.keep_alive_until = Instant::now() + timeout;
                if let Some(max) = ka.max {
                    state.remaining_requests = state.remaining_requests.min(max);
                }
            }
            None => {
                state.keep_alive_until = Instant::now() + DEFAULT_KEEP_ALIVE;
            }
        }
    }
}

/// A borrowed (or free-standing) connection.
///
/// Carries the owning pool so that the connection finds its way back even
/// when the session has long evicted the pool from its map.
pub(crate) struct ConnHandle {
    pub(crate) conn: Arc<Connection>,
    pub(crate) pool: Option<ConnectionPool>,
}

impl ConnHandle {
    /// The central operation: send one request, return a [`Stream`]
    /// positioned at the first body byte.
    pub fn open_request(
        self,
        params: &RequestParams,
        source: &mut dyn Source,
    ) -> Result<Stream, Error> {
        let conn = self.conn.clone();

        if let Err(e) = conn.write_gate.lock() {
            self.abandon();
            return Err(e);
        }

        // on success the read gate is held (by the stream) before the
        // write gate is released; that order keeps responses paired to
        // requests
        let result = self.request_with_write_gate(params, source);
        conn.write_gate.unlock();
        result
    }

    fn request_with_write_gate(
        self,
        params: &RequestParams,
        source: &mut dyn Source,
    ) -> Result<Stream, Error> {
        let conn = self.conn.clone();

        if conn.needs_reconnect() {
            if let Err(e) = conn.reconnect(self.pool.as_ref()) {
                self.abandon();
                return Err(e);
            }
        }

        let (head, chunked_body) = match build_head(&conn, params, source) {
            Ok(v) => v,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        // single reconnection attempt on a connection the server tore down
        // between our requests
        let mut retried = false;
        loop {
            match conn.write_request(&head, source, chunked_body) {
                Ok(()) => break,
                Err(e) => {
                    let recoverable = matches!(
                        e.kind(),
                        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                    );
                    if recoverable && !retried {
                        retried = true;
                        debug!("rewriting request after: {}", e);
                        if let Err(e) = conn
                            .reconnect(self.pool.as_ref())
                            .and_then(|_| source.reset())
                        {
                            self.abandon();
                            return Err(e);
                        }
                        continue;
                    }
                    conn.mark_broken();
                    self.abandon();
                    return Err(Error::Io(e));
                }
            }
        }

        if let Err(e) = conn.read_gate.lock() {
            self.abandon();
            return Err(e);
        }

        let (header, prefix) = match conn.read_response_head() {
            Ok(v) => v,
            Err(e) => {
                conn.mark_broken();
                conn.read_gate.unlock();
                self.abandon();
                return Err(e);
            }
        };

        trace!("{} {} -> {}", params.method, params.target, header.status());

        if let Some(jar) = params.jar {
            store_cookies(jar, &header, conn.host(), params.target, params.psl);
        }

        conn.note_response(&header);

        let is_head = *params.method == Method::HEAD;
        Ok(Stream::new(header, is_head, RawBody::new(self, prefix)))
    }

    /// Switch protocols: perform an `Upgrade` handshake and take the raw
    /// transport out of connection management.
    ///
    /// Both gates are held for the whole exchange since the transport
    /// leaves HTTP framing behind on success.
    pub fn upgrade(self, params: &RequestParams) -> Result<Upgraded, Error> {
        let conn = self.conn.clone();

        conn.write_gate.lock().map_err(|e| {
            self.abandon_ref();
            e
        })?;

        let result = self.upgrade_with_write_gate(params);
        conn.write_gate.unlock();
        result
    }

    fn upgrade_with_write_gate(self, params: &RequestParams) -> Result<Upgraded, Error> {
        let conn = self.conn.clone();

        if conn.needs_reconnect() {
            if let Err(e) = conn.reconnect(self.pool.as_ref()) {
                self.abandon();
                return Err(e);
            }
        }

        let mut source = crate::source::Empty;
        let (head, _) = match build_head(&conn, params, &mut source) {
            Ok(v) => v,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        if let Err(e) = conn.write_request(&head, &mut source, false) {
            conn.mark_broken();
            self.abandon();
            return Err(Error::Io(e));
        }

        if let Err(e) = conn.read_gate.lock() {
            self.abandon();
            return Err(e);
        }

        let result = (|| {
            let (header, prefix) = conn.read_response_head().map_err(|e| {
                conn.mark_broken();
                e
            })?;

            let upgraded = header.status() == http::StatusCode::SWITCHING_PROTOCOLS
                && header
                    .header("upgrade")
                    .map(|v| v.eq_ignore_ascii_case("websocket"))
                    .unwrap_or(false);
            if !upgraded {
                conn.mark_broken();
                return Err(Error::FailedUpgrade(header.status().as_u16()));
            }

            if let Some(jar) = params.jar {
                store_cookies(jar, &header, conn.host(), params.target, params.psl);
            }

            let read = conn.read_half.lock().unwrap().take();
            let write = conn.write_half.lock().unwrap().take();
            conn.state.lock().unwrap().open = false;

            match (read, write) {
                (Some(read), Some(write)) => Ok(Upgraded::new(header, prefix, read, write)),
                _ => Err(Error::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "connection closed",
                ))),
            }
        })();

        conn.read_gate.unlock();

        match result {
            Ok(upgraded) => {
                // ownership of the transport has moved out of the pool
                if let Some(pool) = &self.pool {
                    pool.steal_connection(&self.conn);
                }
                Ok(upgraded)
            }
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    /// Give the connection back to its pool for reuse.
    pub fn release(self) {
        match self.pool {
            Some(pool) => pool.return_connection(self.conn, true),
            None => {}
        }
    }

    // The connection is not coming back: close it and drop it from the pool.
    fn abandon(self) {
        self.abandon_ref();
    }

    fn abandon_ref(&self) {
        self.conn.mark_broken();
        self.conn.close_quiet();
        if let Some(pool) = &self.pool {
            pool.remove_connection(&self.conn);
        }
    }
}

fn store_cookies(
    jar: &CookieJar,
    header: &ResponseHeader,
    host: &str,
    target: &str,
    psl: &PublicSuffixList,
) {
    let path = target.split('?').next().unwrap_or("/");
    for value in header.all("set-cookie") {
        match parse_set_cookie(value) {
            Ok(sc) => {
                if !jar.set(&sc, host, false, path, psl) {
                    debug!("cookie rejected: {}={}", sc.name, sc.value);
                }
            }
            Err(e) => debug!("ignoring malformed set-cookie: {}", e),
        }
    }
}

// Serialize the request line and headers; decide the body framing.
fn build_head(
    conn: &Connection,
    params: &RequestParams,
    source: &mut dyn Source,
) -> Result<(Vec<u8>, bool), Error> {
    let headers = params.headers;

    let has_host = headers.contains_key(HOST);
    let has_ua = headers.contains_key(USER_AGENT);
    let has_cookie = headers.contains_key(COOKIE);
    let has_content_type = headers.contains_key(CONTENT_TYPE);
    let has_length = headers.contains_key(CONTENT_LENGTH);
    let has_te_chunked = headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    let chunked_body = if has_te_chunked {
        true
    } else if has_length {
        false
    } else {
        source.size().is_none()
    };

    let mut head = Vec::with_capacity(512);
    write!(head, "{} {} HTTP/1.1\r\n", params.method, params.target)?;

    if !has_host {
        write!(head, "Host: {}\r\n", conn.host_header)?;
    }
    if !has_ua {
        write!(head, "User-Agent: {}\r\n", params.user_agent)?;
    }
    if !has_cookie {
        if let Some(jar) = params.jar {
            let path = params.target.split('?').next().unwrap_or("/");
            let value = jar.get(conn.host(), conn.secure, path);
            if !value.is_empty() {
                write!(head, "Cookie: {}\r\n", value)?;
            }
        }
    }
    // bodyless methods do not advertise their empty body
    let method_has_body = *params.method == Method::POST
        || *params.method == Method::PUT
        || *params.method == Method::PATCH;

    if !has_length && !has_te_chunked {
        match source.size() {
            Some(0) if !method_has_body => {}
            Some(size) => write!(head, "Content-Length: {}\r\n", size)?,
            None => write!(head, "Transfer-Encoding: chunked\r\n")?,
        }
    }
    if !has_content_type {
        if let Some(content_type) = source.default_content_type() {
            write!(head, "Content-Type: {}\r\n", content_type)?;
        }
    }

    for (name, value) in headers.iter() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");

    Ok((head, chunked_body))
}

struct KeepAlive {
    timeout: Option<Duration>,
    max: Option<u64>,
}

// "Keep-Alive: timeout=5, max=100"
fn parse_keep_alive(value: &str) -> KeepAlive {
    let mut ka = KeepAlive {
        timeout: None,
        max: None,
    };
    for part in value.split(',') {
        if let Some((key, num)) = part.trim().split_once('=') {
            if key.trim().eq_ignore_ascii_case("timeout") {
                ka.timeout = num.trim().parse().ok().map(Duration::from_secs);
            } else if key.trim().eq_ignore_ascii_case("max") {
                ka.max = num.trim().parse().ok();
            }
        }
    }
    ka
}
