use std::sync::Once;

use tracing_subscriber::{fmt::format::FmtSpan, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Installs a compact `tracing` subscriber once per process.
///
/// Filtering follows `RUST_LOG`; without it, `default_filter` applies
/// (e.g. `"info"` for the CLI, `"off"` for benches).
pub fn setup_logger(default_filter: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        // another subscriber may already be installed by the host process
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .compact()
            .with_file(false)
            .with_target(false)
            .with_thread_names(false)
            .with_env_filter(env_filter)
            .with_span_events(FmtSpan::CLOSE)
            .finish()
            .try_init();
    });
}
