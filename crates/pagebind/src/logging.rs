//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is left to
//! the test binary. [`init`] is a convenience for the common case.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor an explicit filter is usable
pub const DEFAULT_FILTER: &str = "pagebind=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, else by `filter`.
///
/// Returns `false` when a global subscriber is already installed, so calling
/// this from every test is harmless.
pub fn init(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init("pagebind=debug");
        assert!(!init("pagebind=debug"));
    }
}
