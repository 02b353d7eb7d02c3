//! Structured logging setup.
//!
//! Verbosity comes from RUST_LOG, defaulting to `info,lumen_core=debug`.
//! Logs go to stderr so stdout only carries command output.
//!
//! Example RUST_LOG values:
//! - `warn` - quiet
//! - `lumen_core=trace` - everything from the pipeline

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,lumen_core=debug";

pub fn init_telemetry(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}
