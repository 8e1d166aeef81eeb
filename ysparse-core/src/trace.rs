//! Diagnostic tracing switch.
//!
//! The library only emits `tracing` events; nothing is printed unless
//! [`init`] installs the stderr subscriber, which it does only when
//! `YSPARSE_DEBUG` is enabled. Tracing never influences return values.

use tracing_subscriber::EnvFilter;

use crate::config::{Config, DEFAULT_LOG_FILTER};

/// Install the stderr subscriber if debugging is enabled.
///
/// Returns `true` if this call installed it. A subscriber installed
/// elsewhere (an embedding application, a test harness) is left alone.
pub fn init(config: &Config) -> bool {
    if !config.debug {
        return false;
    }
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
