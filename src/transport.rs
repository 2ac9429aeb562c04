//! Byte transports underneath a connection.
//!
//! A connected transport is split into a read and a write half so that one
//! task can stream a response body while another starts writing the next
//! request. For plain sockets the halves are clones of the socket; for TLS
//! they share the record layer (see [`crate::tls::rustls`]).

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A resolved transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// TCP to a resolved socket address.
    Tcp(SocketAddr),
    /// A local stream socket path.
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Connect a plain (non-TLS) transport to `endpoint`.
pub(crate) fn connect_plain(endpoint: &Endpoint) -> io::Result<(ReadHalf, WriteHalf)> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let sock = connect_tcp(addr)?;
            let read = sock.try_clone()?;
            Ok((ReadHalf::Tcp(read), WriteHalf::Tcp(sock)))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let sock = UnixStream::connect(path)?;
            let read = sock.try_clone()?;
            Ok((ReadHalf::Unix(read), WriteHalf::Unix(sock)))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        )),
    }
}

pub(crate) fn connect_tcp(addr: &SocketAddr) -> io::Result<TcpStream> {
    let sock = TcpStream::connect(addr)?;
    sock.set_nodelay(true).ok();
    Ok(sock)
}

pub(crate) enum ReadHalf {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "rustls")]
    Tls(crate::tls::rustls::TlsReadHalf),
}

impl Read for ReadHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReadHalf::Tcp(sock) => sock.read(buf),
            #[cfg(unix)]
            ReadHalf::Unix(sock) => sock.read(buf),
            #[cfg(feature = "rustls")]
            ReadHalf::Tls(tls) => tls.read(buf),
        }
    }
}

pub(crate) enum WriteHalf {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(feature = "rustls")]
    Tls(crate::tls::rustls::TlsWriteHalf),
}

impl WriteHalf {
    /// Tear the transport down. For TLS this sends close_notify first.
    pub(crate) fn close(&mut self) {
        match self {
            WriteHalf::Tcp(sock) => {
                let _ = sock.shutdown(Shutdown::Both);
            }
            #[cfg(unix)]
            WriteHalf::Unix(sock) => {
                let _ = sock.shutdown(Shutdown::Both);
            }
            #[cfg(feature = "rustls")]
            WriteHalf::Tls(tls) => tls.close(),
        }
    }
}

impl Write for WriteHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            WriteHalf::Tcp(sock) => sock.write(buf),
            #[cfg(unix)]
            WriteHalf::Unix(sock) => sock.write(buf),
            #[cfg(feature = "rustls")]
            WriteHalf::Tls(tls) => tls.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            WriteHalf::Tcp(sock) => sock.flush(),
            #[cfg(unix)]
            WriteHalf::Unix(sock) => sock.flush(),
            #[cfg(feature = "rustls")]
            WriteHalf::Tls(tls) => tls.flush(),
        }
    }
}

impl fmt::Debug for ReadHalf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self {
            ReadHalf::Tcp(_) => "tcp",
            #[cfg(unix)]
            ReadHalf::Unix(_) => "unix",
            #[cfg(feature = "rustls")]
            ReadHalf::Tls(_) => "tls",
        };
        write!(f, "ReadHalf[{}]", kind)
    }
}

impl fmt::Debug for WriteHalf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self {
            WriteHalf::Tcp(_) => "tcp",
            #[cfg(unix)]
            WriteHalf::Unix(_) => "unix",
            #[cfg(feature = "rustls")]
            WriteHalf::Tls(_) => "tls",
        };
        write!(f, "WriteHalf[{}]", kind)
    }
}
