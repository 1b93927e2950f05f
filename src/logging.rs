use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber used by the binaries. `RUST_LOG` overrides the
/// default `info` level; calling this twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(false)
        .try_init();
}

