//! Per-origin connection pooling.
//!
//! A pool owns every connection to one origin. Borrowing hands out an idle
//! connection, or creates one while under the size limit, or blocks until a
//! stream finishes and returns its connection. New connections go to the
//! least used resolved address, which spreads load over multi-homed hosts.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use crate::conn::{ConnHandle, Connection, TlsContext};
use crate::resolver::Resolver;
use crate::transport::Endpoint;
use crate::Error;

#[derive(Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    host: String,
    host_header: String,
    secure: bool,
    max_size: usize,
    tls: TlsContext,
    state: Mutex<PoolState>,
    cond: Condvar,
}

struct PoolState {
    endpoints: Vec<Endpoint>,
    active: Vec<Arc<Connection>>,
    free: Vec<Arc<Connection>>,
    closed: bool,
}

impl ConnectionPool {
    pub fn new(
        host: String,
        host_header: String,
        secure: bool,
        max_size: usize,
        tls: TlsContext,
    ) -> ConnectionPool {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                host,
                host_header,
                secure,
                max_size: max_size.max(1),
                tls,
                state: Mutex::new(PoolState {
                    endpoints: Vec::new(),
                    active: Vec::new(),
                    free: Vec::new(),
                    closed: false,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn is_secure(&self) -> bool {
        self.inner.secure
    }

    /// Resolve the origin's host to endpoints. Runs the resolver exactly
    /// once per call; callers decide when a refresh is due. Connections to
    /// addresses that fell out of the answer are dropped from the idle set.
    pub fn lookup(&self, resolver: &dyn Resolver, port: u16) -> Result<(), Error> {
        let addrs = resolver.resolve(&self.inner.host, port)?;
        if addrs.is_empty() {
            return Err(Error::NotFound(self.inner.host.clone()));
        }
        let endpoints: Vec<Endpoint> = addrs.into_iter().map(Endpoint::Tcp).collect();
        debug!("{} resolved to {} endpoints", self.inner.host, endpoints.len());

        let mut state = self.inner.state.lock().unwrap();
        state.endpoints = endpoints;
        let keep = state.endpoints.clone();
        state.free.retain(|conn| {
            let stays = keep.contains(&conn.endpoint());
            if !stays {
                conn.close_quiet();
            }
            stays
        });
        Ok(())
    }

    /// Point the pool at a local socket path. No resolution involved.
    pub fn lookup_unix(&self, path: PathBuf) {
        let mut state = self.inner.state.lock().unwrap();
        state.endpoints = vec![Endpoint::Unix(path)];
    }

    /// Borrow a connection, waiting for a free slot if the pool is at its
    /// limit. A waiter wakes with [`Error::Aborted`] when the pool closes.
    pub fn borrow_connection(&self) -> Result<ConnHandle, Error> {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if state.closed {
                return Err(Error::Aborted);
            }

            // prefer reusing an idle connection; stale ones are discarded
            while let Some(conn) = state.free.pop() {
                if conn.is_reusable() {
                    state.active.push(conn.clone());
                    return Ok(self.handle(conn));
                }
                conn.close_quiet();
            }

            if state.active.len() < self.inner.max_size {
                if state.endpoints.is_empty() {
                    return Err(Error::NotFound(self.inner.host.clone()));
                }
                let endpoint = least_used(&state);
                let conn = Arc::new(Connection::new(
                    self.inner.host.clone(),
                    self.inner.host_header.clone(),
                    self.inner.secure,
                    endpoint,
                    self.inner.tls.clone(),
                ));
                state.active.push(conn.clone());
                return Ok(self.handle(conn));
            }

            state = self.inner.cond.wait(state).unwrap();
        }
    }

    fn handle(&self, conn: Arc<Connection>) -> ConnHandle {
        ConnHandle {
            conn,
            pool: Some(self.clone()),
        }
    }

    /// Put a borrowed connection back. `reuse` is the caller's verdict;
    /// the connection's own keep-alive state is honored on top of it.
    pub fn return_connection(&self, conn: Arc<Connection>, reuse: bool) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(idx) = state.active.iter().position(|c| Arc::ptr_eq(c, &conn)) {
            state.active.remove(idx);
        }

        let keep = reuse
            && !state.closed
            && conn.is_reusable()
            && state.endpoints.contains(&conn.endpoint());
        if keep {
            state.free.push(conn);
        } else {
            conn.close_quiet();
        }
        drop(state);
        self.inner.cond.notify_one();
    }

    /// Discard a connection entirely.
    pub fn remove_connection(&self, conn: &Arc<Connection>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(idx) = state.active.iter().position(|c| Arc::ptr_eq(c, conn)) {
            state.active.remove(idx);
        }
        if let Some(idx) = state.free.iter().position(|c| Arc::ptr_eq(c, conn)) {
            state.free.remove(idx);
        }
        drop(state);
        conn.close_quiet();
        self.inner.cond.notify_one();
    }

    /// Transfer a connection out of pool management (protocol upgrade).
    /// The transport stays open; the slot is freed.
    pub fn steal_connection(&self, conn: &Arc<Connection>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(idx) = state.active.iter().position(|c| Arc::ptr_eq(c, conn)) {
            state.active.remove(idx);
        }
        drop(state);
        self.inner.cond.notify_one();
    }

    /// Drop an address that failed to connect.
    pub fn discard_endpoint(&self, endpoint: &Endpoint) {
        let mut state = self.inner.state.lock().unwrap();
        state.endpoints.retain(|e| e != endpoint);
    }

    /// The least used remaining address, if any.
    pub fn pick_endpoint(&self) -> Option<Endpoint> {
        let state = self.inner.state.lock().unwrap();
        if state.endpoints.is_empty() {
            None
        } else {
            Some(least_used(&state))
        }
    }

    /// Close the pool: idle connections are torn down and every borrow
    /// waiter wakes with [`Error::Aborted`]. Borrowed connections finish
    /// their current exchange and are closed on return.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.closed = true;
        for conn in state.free.drain(..) {
            conn.close_quiet();
        }
        drop(state);
        self.inner.cond.notify_all();
    }

    #[cfg(test)]
    pub fn counts(&self) -> (usize, usize) {
        let state = self.inner.state.lock().unwrap();
        (state.active.len(), state.free.len())
    }
}

// Endpoints sorted ascending by the number of connections already open to
// each; we only ever need the front of that order.
fn least_used(state: &PoolState) -> Endpoint {
    let count = |ep: &Endpoint| {
        state
            .active
            .iter()
            .chain(state.free.iter())
            .filter(|c| c.endpoint() == *ep)
            .count()
    };
    state
        .endpoints
        .iter()
        .min_by_key(|ep| count(ep))
        .expect("nonempty endpoint list")
        .clone()
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("ConnectionPool")
            .field("host", &self.inner.host)
            .field("secure", &self.inner.secure)
            .field("endpoints", &state.endpoints.len())
            .field("active", &state.active.len())
            .field("free", &state.free.len())
            .finish()
    }
}
