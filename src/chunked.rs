//! Chunked transfer coding (RFC 7230 §4.1).
//!
//! The decoder wraps the raw body reader of one response. It never reads
//! past the terminating chunk, so the bytes of the next response on a
//! keep-alive connection stay untouched in the transport.

use std::io::{self, Read, Write};

/// Reads HTTP chunks and hands back the decoded payload.
pub(crate) struct Decoder<R> {
    source: R,
    // remaining bytes of the chunk being read. None if between chunks.
    remaining: Option<usize>,
    ended: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(source: R) -> Decoder<R> {
        Decoder {
            source,
            remaining: None,
            ended: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut one = [0u8; 1];
        loop {
            match self.source.read(&mut one)? {
                0 => return Err(bad_chunk("unexpected eof in chunk framing")),
                _ => return Ok(one[0]),
            }
        }
    }

    fn expect_crlf(&mut self) -> io::Result<()> {
        if self.read_byte()? != b'\r' || self.read_byte()? != b'\n' {
            return Err(bad_chunk("chunk not terminated by crlf"));
        }
        Ok(())
    }

    // Reads "SIZE[;ext]\r\n". The size is hex.
    fn read_chunk_size(&mut self) -> io::Result<usize> {
        let mut digits = Vec::new();
        let mut in_ext = false;

        loop {
            let byte = self.read_byte()?;
            match byte {
                b'\r' => break,
                b';' => in_ext = true,
                _ if in_ext => {}
                _ => digits.push(byte),
            }
        }

        if self.read_byte()? != b'\n' {
            return Err(bad_chunk("chunk size not terminated by crlf"));
        }

        String::from_utf8(digits)
            .ok()
            .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
            .ok_or_else(|| bad_chunk("bad chunk size"))
    }

    // After the zero sized chunk comes an (ignored) trailer section and a
    // final empty line.
    fn read_trailers(&mut self) -> io::Result<()> {
        loop {
            let mut len = 0usize;
            loop {
                let byte = self.read_byte()?;
                if byte == b'\n' {
                    break;
                }
                if byte != b'\r' {
                    len += 1;
                }
            }
            if len == 0 {
                return Ok(());
            }
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.ended || buf.is_empty() {
            return Ok(0);
        }

        let remaining = match self.remaining {
            Some(n) => n,
            None => {
                let size = self.read_chunk_size()?;
                if size == 0 {
                    self.read_trailers()?;
                    self.ended = true;
                    return Ok(0);
                }
                size
            }
        };

        let wanted = remaining.min(buf.len());
        let n = self.source.read(&mut buf[..wanted])?;
        if n == 0 {
            return Err(bad_chunk("unexpected eof inside chunk"));
        }

        self.remaining = if n == remaining {
            self.expect_crlf()?;
            None
        } else {
            Some(remaining - n)
        };

        Ok(n)
    }
}

fn bad_chunk(what: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what)
}

/// Write one body chunk in chunked framing.
pub(crate) fn write_chunk(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    write!(w, "{:x}\r\n", data.len())?;
    w.write_all(data)?;
    w.write_all(b"\r\n")
}

/// Write the terminating zero sized chunk.
pub(crate) fn write_final_chunk(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"0\r\n\r\n")
}
