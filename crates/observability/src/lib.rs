//! Process-wide tracing/logging setup shared by genpress services.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process with the default filter.
///
/// Safe to call multiple times (subsequent calls are no-ops); tests lean on
/// that to set up logging per test binary.
pub fn init() {
    init_with_filter("info");
}

/// Initialize with an explicit fallback filter, still overridable via
/// `RUST_LOG`.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // JSON logs + timestamps, configurable via RUST_LOG.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn repeated_init_is_a_noop() {
        super::init();
        super::init_with_filter("debug");
        tracing::info!("still alive after double init");
    }
}
