//! Logging setup
//!
//! The library only emits `tracing` events. Binaries, benches and tests that
//! want to see them call [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"nestedset_core=debug"`)
///
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls from several tests harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("nestedset_core=debug");
        assert!(!init_tracing("nestedset_core=debug"));
    }
}
