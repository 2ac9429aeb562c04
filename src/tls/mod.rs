//! TLS for handling `https` and `wss`.

use std::fmt;
use std::sync::Arc;

use rustls_pki_types::CertificateDer;

pub(crate) mod rustls;

/// Configuration of TLS.
///
/// The configured trust anchors verify every `https`/`wss` connection of a
/// session. Verification failures fail the request; there is no
/// "continue anyway" path apart from the explicit (and dangerous)
/// [`disable_verification`][TlsConfig::disable_verification].
#[derive(Clone)]
pub struct TlsConfig {
    root_certs: RootCerts,
    disable_verification: bool,
}

impl TlsConfig {
    /// The set of trusted root certificates used to validate server
    /// certificates.
    ///
    /// Defaults to [`RootCerts::WebPki`].
    pub fn root_certs(&self) -> &RootCerts {
        &self.root_certs
    }

    /// Whether server certificate verification is disabled.
    pub fn disable_verification(&self) -> bool {
        self.disable_verification
    }

    /// Use a specific set of trust anchors.
    pub fn with_root_certs(mut self, certs: Vec<CertificateDer<'static>>) -> Self {
        self.root_certs = RootCerts::Specific(Arc::new(certs));
        self
    }

    /// **WARNING** Disable all server certificate verification.
    ///
    /// This breaks the protection TLS offers. Only for test setups.
    pub fn with_disabled_verification(mut self, disable: bool) -> Self {
        self.disable_verification = disable;
        self
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            root_certs: RootCerts::WebPki,
            disable_verification: false,
        }
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("root_certs", &self.root_certs)
            .field("disable_verification", &self.disable_verification)
            .finish()
    }
}

/// Configuration setting for root certs.
#[derive(Clone)]
pub enum RootCerts {
    /// Mozilla's root certificates, compiled in.
    ///
    /// This is the default value.
    WebPki,

    /// Use these specific certificates as root certs.
    Specific(Arc<Vec<CertificateDer<'static>>>),
}

impl fmt::Debug for RootCerts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RootCerts::WebPki => write!(f, "WebPki"),
            RootCerts::Specific(certs) => write!(f, "Specific({} certs)", certs.len()),
        }
    }
}
