//! Pluggable name resolution.
//!
//! A pool resolves its host exactly once, when it is created (and again
//! only on an explicit re-lookup). The resolver returns *all* addresses so
//! the pool can spread connections over multiple A/AAAA records.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::ops::Deref;
use std::sync::Arc;

/// Trait for name resolvers.
///
/// A `Fn(&str, u16) -> io::Result<Vec<SocketAddr>>` closure is a valid
/// resolver, which is handy for tests and DNS-based load balancing:
///
/// ```
/// use std::net::ToSocketAddrs;
///
/// let session = requests::Session::builder()
///     .resolver(|host: &str, port: u16| match host {
///         "service.internal" => Ok(vec![([10, 0, 0, 7], port).into()]),
///         _ => (host, port).to_socket_addrs().map(Iterator::collect),
///     })
///     .build();
/// ```
pub trait Resolver: Send + Sync + 'static {
    /// Resolve `host` to socket addresses with `port` filled in.
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

impl<F> Resolver for F
where
    F: Fn(&str, u16) -> io::Result<Vec<SocketAddr>> + Send + Sync + 'static,
{
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        self(host, port)
    }
}

/// Default resolver going through [`ToSocketAddrs`].
#[derive(Debug, Default)]
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        (host, port).to_socket_addrs().map(Iterator::collect)
    }
}

#[derive(Clone)]
pub(crate) struct ArcResolver(Arc<dyn Resolver>);

impl<R: Resolver> From<R> for ArcResolver {
    fn from(resolver: R) -> Self {
        ArcResolver(Arc::new(resolver))
    }
}

impl Default for ArcResolver {
    fn default() -> Self {
        DefaultResolver.into()
    }
}

impl Deref for ArcResolver {
    type Target = dyn Resolver;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for ArcResolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ArcResolver").finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn localhost_resolves() {
        let addrs = DefaultResolver.resolve("localhost", 80).unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.port() == 80));
    }

    #[test]
    fn closure_resolver() {
        let resolver: ArcResolver = (|_: &str, port: u16| -> io::Result<Vec<SocketAddr>> {
            Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
        })
        .into();
        let addrs = resolver.resolve("anything", 9999).unwrap();
        assert_eq!(addrs, vec![SocketAddr::from(([127, 0, 0, 1], 9999))]);
    }
}
