//! Blocking full-duplex TLS over a TCP socket.
//!
//! The rustls state machine is shared behind a mutex while each half owns a
//! clone of the socket. Record generation happens under the lock, but the
//! blocking *read* of ciphertext happens outside it, so a response body can
//! be streamed while the next request starts writing.

use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ALL_VERSIONS};
use rustls_pki_types::{CertificateDer, ServerName};

use crate::tls::{RootCerts, TlsConfig};
use crate::Error;

pub(crate) fn build_config(tls_config: &TlsConfig) -> Arc<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(ALL_VERSIONS)
        .expect("all TLS versions");

    let builder = if tls_config.disable_verification() {
        debug!("Certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DisabledVerifier))
    } else {
        let mut root_store = RootCertStore::empty();
        match tls_config.root_certs() {
            RootCerts::WebPki => {
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }
            RootCerts::Specific(certs) => {
                let (added, ignored) =
                    root_store.add_parsable_certificates(certs.iter().map(|c| c.clone()));
                debug!("Added {} and ignored {} root certs", added, ignored);
            }
        }
        builder.with_root_certificates(root_store)
    };

    Arc::new(builder.with_no_client_auth())
}

/// Perform the handshake on `sock` and split into independent halves.
///
/// The handshake runs to completion here, which is why connecting a TLS
/// connection holds both the write and the read side of it.
pub(crate) fn wrap(
    sock: TcpStream,
    host: &str,
    config: Arc<ClientConfig>,
) -> Result<(TlsReadHalf, TlsWriteHalf), Error> {
    let name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::parse(format!("invalid tls name: {}", host)))?;

    let mut conn = ClientConnection::new(config, name)?;

    let mut io = &sock;
    while conn.is_handshaking() {
        conn.complete_io(&mut io).map_err(unwrap_tls_error)?;
    }

    let read_sock = sock.try_clone()?;
    let conn = Arc::new(Mutex::new(conn));

    Ok((
        TlsReadHalf {
            conn: conn.clone(),
            sock: read_sock,
            raw_eof: false,
        },
        TlsWriteHalf { conn, sock },
    ))
}

// rustls failures surface through complete_io as InvalidData io errors
fn unwrap_tls_error(e: io::Error) -> Error {
    match e.get_ref().and_then(|r| r.downcast_ref::<rustls::Error>()) {
        Some(tls) => Error::Tls(tls.clone()),
        None => Error::Io(e),
    }
}

pub(crate) struct TlsReadHalf {
    conn: Arc<Mutex<ClientConnection>>,
    sock: TcpStream,
    raw_eof: bool,
}

impl Read for TlsReadHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            {
                let mut conn = self.conn.lock().unwrap();
                match conn.reader().read(buf) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                    // peer closed without close_notify; treat as eof, the
                    // http framing decides whether the body was truncated
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                    Err(e) => return Err(e),
                }
                if self.raw_eof {
                    return Ok(0);
                }
                // answer key updates and other post-handshake traffic
                while conn.wants_write() {
                    let mut sock = &self.sock;
                    conn.write_tls(&mut sock)?;
                }
            }

            // wait for ciphertext without holding the lock, so the write
            // half stays usable while we block
            let mut tmp = [0u8; 16 * 1024];
            let n = (&self.sock).read(&mut tmp)?;
            if n == 0 {
                self.raw_eof = true;
                continue;
            }

            let mut slice = &tmp[..n];
            let mut conn = self.conn.lock().unwrap();
            while !slice.is_empty() {
                let used = conn.read_tls(&mut slice)?;
                if used == 0 {
                    break;
                }
                conn.process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            }
        }
    }
}

pub(crate) struct TlsWriteHalf {
    conn: Arc<Mutex<ClientConnection>>,
    sock: TcpStream,
}

impl TlsWriteHalf {
    /// Orderly TLS shutdown: send close_notify and close the socket.
    pub(crate) fn close(&mut self) {
        let mut conn = self.conn.lock().unwrap();
        conn.send_close_notify();
        while conn.wants_write() {
            let mut sock = &self.sock;
            if conn.write_tls(&mut sock).is_err() {
                break;
            }
        }
        drop(conn);
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}

impl Write for TlsWriteHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let n = conn.writer().write(buf)?;
        while conn.wants_write() {
            let mut sock = &self.sock;
            conn.write_tls(&mut sock)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.sock).flush()
    }
}

#[derive(Debug)]
struct DisabledVerifier;

impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
