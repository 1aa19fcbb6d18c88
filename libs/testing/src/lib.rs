//! Shared helpers for verification runs.
//!
//! - [`SoftAssert`]: collect every mismatch of a comparison pass instead of
//!   stopping at the first one.
//! - [`init_tracing`]: route `tracing` output to the test harness.
//! - [`gen_alpha`] / [`gen_alphanumeric`] / [`unique_name`]: random suffixes
//!   for resources created during a run.

mod names;
mod soft;

pub use names::{gen_alpha, gen_alphanumeric, unique_name};
pub use soft::{SoftAssert, SoftAssertError};

/// Initialise tracing for tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// The filter comes from `RUST_LOG`, defaulting to debug output for the
/// workspace crates.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,ssa_wait=debug,ssa_inventory=debug,ssa_smartstate=debug".into()
            }),
        )
        .with_test_writer()
        .try_init();
}
