//! End-to-end tests against the in-crate test server.

use once_cell::sync::Lazy;

mod cookie;
mod pool;
mod redirect;
mod simple;

pub(crate) fn init_test_log() {
    static INIT_LOG: Lazy<()> = Lazy::new(|| {
        let _ = env_logger::try_init();
    });
    *INIT_LOG
}
