//! Diagnostic logging.
//!
//! Diagnostics go through `tracing` to **stderr** so they never mix with the
//! progress stream and summary on stdout. The level comes from
//! `TOOLPRESS_LOG` (an `EnvFilter` directive such as `debug` or
//! `toolpress=trace`), defaulting to `warn`; `--verbose` raises the default to
//! `debug`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "TOOLPRESS_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "toolpress=debug"
    } else {
        "warn"
    }
}

/// Build the filter from `TOOLPRESS_LOG`, falling back to the default level.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
