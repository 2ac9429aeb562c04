//! Streaming response bodies.
//!
//! A [`Stream`] is handed out by a connection once the response head is in.
//! It owns the connection borrow and the connection's read lock. Draining
//! the body (or [`dump()`][Stream::dump]) releases the lock and returns the
//! connection to its pool. Dropping a stream with body bytes still pending
//! closes the connection instead: the framing position would be unknown,
//! so the transport cannot be reused.

use std::io::{self, Read, Write};

use crate::chunked;
use crate::conn::ConnHandle;
use crate::response::ResponseHeader;
use crate::Error;

pub(crate) struct RawBody {
    handle: Option<ConnHandle>,
    prefix: Vec<u8>,
    pos: usize,
}

impl RawBody {
    pub(crate) fn new(handle: ConnHandle, prefix: Vec<u8>) -> RawBody {
        RawBody {
            handle: Some(handle),
            prefix,
            pos: 0,
        }
    }

    // Clean completion: unlock the read side and give the connection back.
    fn release(&mut self, reusable: bool) {
        if let Some(handle) = self.handle.take() {
            handle.conn.unlock_read();
            if !reusable {
                handle.conn.mark_broken();
            }
            match handle.pool {
                Some(pool) => pool.return_connection(handle.conn, reusable),
                None => {
                    if !reusable {
                        handle.conn.close_quiet();
                    }
                }
            }
        }
    }

    // Clean completion, but keep the borrow for a follow-up request on the
    // same connection (redirect hop). None if the connection cannot take
    // another request.
    fn release_keeping(&mut self) -> Option<ConnHandle> {
        let handle = self.handle.take()?;
        handle.conn.unlock_read();
        if handle.conn.is_reusable() {
            Some(handle)
        } else {
            handle.conn.close_quiet();
            if let Some(pool) = &handle.pool {
                pool.remove_connection(&handle.conn);
            }
            None
        }
    }
}

impl Read for RawBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let n = (self.prefix.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        match &self.handle {
            Some(handle) => handle.conn.read_body(buf),
            None => Ok(0),
        }
    }
}

impl Drop for RawBody {
    fn drop(&mut self) {
        // abandoned mid-body; subsequent framing would be ambiguous
        if let Some(handle) = self.handle.take() {
            handle.conn.mark_broken();
            handle.conn.close_quiet();
            handle.conn.unlock_read();
            if let Some(pool) = handle.pool {
                pool.remove_connection(&handle.conn);
            }
        }
    }
}

enum BodyReader {
    Empty(RawBody),
    Limited { raw: RawBody, remaining: u64 },
    Chunked(chunked::Decoder<RawBody>),
    CloseDelimited(RawBody),
}

impl BodyReader {
    fn raw_mut(&mut self) -> &mut RawBody {
        match self {
            BodyReader::Empty(raw) => raw,
            BodyReader::Limited { raw, .. } => raw,
            BodyReader::Chunked(decoder) => decoder.inner_mut(),
            BodyReader::CloseDelimited(raw) => raw,
        }
    }
}

/// A live response: parsed head plus the body as a byte stream.
///
/// Implements [`Read`] for the body. See the module docs for what happens
/// to the underlying connection on completion and on drop.
pub struct Stream {
    header: ResponseHeader,
    reader: BodyReader,
    done: bool,
    // set on the redirect path: completion hands the borrow back to the
    // loop instead of the pool
    kept: Option<ConnHandle>,
    keep_on_finish: bool,
}

impl Stream {
    pub(crate) fn new(header: ResponseHeader, is_head: bool, raw: RawBody) -> Stream {
        let status = header.status().as_u16();
        let no_body = is_head || (100..200).contains(&status) || status == 204 || status == 304;

        let (reader, done) = if no_body {
            (BodyReader::Empty(raw), true)
        } else if header.is_chunked() {
            (BodyReader::Chunked(chunked::Decoder::new(raw)), false)
        } else if let Some(length) = header.content_length() {
            if length == 0 {
                (BodyReader::Empty(raw), true)
            } else {
                (
                    BodyReader::Limited {
                        raw,
                        remaining: length,
                    },
                    false,
                )
            }
        } else {
            // no framing: the body runs until the server closes
            (BodyReader::CloseDelimited(raw), false)
        };

        let mut stream = Stream {
            header,
            reader,
            done,
            kept: None,
            keep_on_finish: false,
        };
        if stream.done {
            // zero length body: the connection is available again right away
            stream.reader.raw_mut().release(true);
        }
        stream
    }

    /// The response head.
    pub fn headers(&self) -> &ResponseHeader {
        &self.header
    }

    /// Whether the body has been fully consumed.
    pub fn done(&self) -> bool {
        self.done
    }

    /// Read the remaining body into a vector.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Stream the remaining body into `w`. Returns the number of bytes.
    pub fn write_to(&mut self, mut w: impl Write) -> Result<u64, Error> {
        let mut buf = [0u8; 16 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            w.write_all(&buf[..n])?;
            total += n as u64;
        }
    }

    /// Discard whatever is left of the body.
    ///
    /// Cheap and safe at any point, including after partial reads. The
    /// connection goes back to its pool just as with a full read.
    pub fn dump(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; 16 * 1024];
        while self.read(&mut buf)? > 0 {}
        Ok(())
    }

    fn finish(&mut self, reusable: bool) {
        if self.done {
            return;
        }
        self.done = true;
        if reusable && self.keep_on_finish {
            self.kept = self.reader.raw_mut().release_keeping();
        } else {
            self.reader.raw_mut().release(reusable);
        }
    }

    // Drain the body and dissolve into parts the redirect loop needs:
    // the head, the body bytes and (when still usable) the connection
    // borrow for the next hop.
    pub(crate) fn into_redirect_parts(
        mut self,
    ) -> Result<(ResponseHeader, Vec<u8>, Option<ConnHandle>), Error> {
        self.keep_on_finish = true;
        let mut body = Vec::new();
        self.read_to_end(&mut body)?;
        let kept = self.kept.take();
        let Stream { header, .. } = self;
        Ok((header, body, kept))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let (n, completed) = match &mut self.reader {
            BodyReader::Empty(_) => (0, Some(true)),
            BodyReader::Limited { raw, remaining } => {
                let wanted = (*remaining).min(buf.len() as u64) as usize;
                let n = raw.read(&mut buf[..wanted])?;
                if n == 0 {
                    // server closed short of content-length
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "body ended before content-length",
                    ));
                }
                *remaining -= n as u64;
                (n, if *remaining == 0 { Some(true) } else { None })
            }
            BodyReader::Chunked(decoder) => {
                let n = decoder.read(buf)?;
                (n, if n == 0 { Some(true) } else { None })
            }
            BodyReader::CloseDelimited(raw) => {
                let n = raw.read(buf)?;
                // eof delimits the body; nothing further can be framed on
                // this transport
                (n, if n == 0 { Some(false) } else { None })
            }
        };

        if let Some(reusable) = completed {
            self.finish(reusable);
        }
        Ok(n)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("status", &self.header.status())
            .field("done", &self.done)
            .finish()
    }
}
