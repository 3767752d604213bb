//! `tracing` subscriber setup for binaries and tests.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "penumbra=info";

/// Installs a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `level` (an `EnvFilter` directive such as `debug` or `penumbra=trace`).
///
/// Only the first call has any effect.
pub fn init_logging(level: Option<&str>) {
    static INIT: Once = Once::new();
    let fallback = level.unwrap_or(DEFAULT_FILTER).to_owned();
    INIT.call_once(move || {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&fallback))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// [`init_logging`] with the default filter.
pub fn install_default() {
    init_logging(None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_installs_are_harmless() {
        install_default();
        init_logging(Some("not a [valid filter"));
        tracing::info!(target: "penumbra", "logging.test");
    }
}
