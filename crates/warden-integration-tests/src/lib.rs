//! Integration test crate for Warden.
//!
//! This crate exists solely for integration testing. It is `publish = false`
//! and carries no library code beyond a tracing bootstrap — all tests live
//! in `tests/`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::sync::Once;

static TRACING: Once = Once::new();

/// Initialize tracing for tests, once per process. Controlled via
/// `RUST_LOG`; silent by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
