//! Raw duplex streams handed over after an `Upgrade` handshake.

use std::io::{self, Read, Write};

use crate::response::ResponseHeader;
use crate::transport::{ReadHalf, WriteHalf};

/// A transport released from HTTP connection management.
///
/// Produced by [`Session::websocket`][crate::Session::websocket] after the
/// server answered `101 Switching Protocols`. Reads first drain any bytes
/// the server sent together with its handshake response, then continue on
/// the socket. A websocket (or other protocol) layer drives the framing
/// from here; this crate does not interpret the bytes.
pub struct Upgraded {
    header: ResponseHeader,
    leftover: Vec<u8>,
    pos: usize,
    read: ReadHalf,
    write: WriteHalf,
}

impl Upgraded {
    pub(crate) fn new(
        header: ResponseHeader,
        leftover: Vec<u8>,
        read: ReadHalf,
        write: WriteHalf,
    ) -> Upgraded {
        Upgraded {
            header,
            leftover,
            pos: 0,
            read,
            write,
        }
    }

    /// The handshake response head, e.g. for checking
    /// `Sec-WebSocket-Accept` or negotiated subprotocols.
    pub fn response(&self) -> &ResponseHeader {
        &self.header
    }

    /// Orderly teardown of the transport.
    pub fn close(mut self) {
        self.write.close();
    }
}

impl Read for Upgraded {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.leftover.len() {
            let n = (self.leftover.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.leftover[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        self.read.read(buf)
    }
}

impl Write for Upgraded {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write.flush()
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Upgraded")
            .field("status", &self.header.status())
            .field("buffered", &(self.leftover.len() - self.pos))
            .finish()
    }
}
