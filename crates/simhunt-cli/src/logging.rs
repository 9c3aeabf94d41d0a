//! Diagnostic logging for the CLI.
//!
//! Library events go to stderr through a `tracing-subscriber` fmt layer so
//! stdout stays clean for rendered reports. `RUST_LOG` wins over the `-v`/`-q`
//! flags when set.

use crate::config::Verbosity;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` if set, otherwise the verbosity default
#[must_use]
pub fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()))
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbosity: Verbosity, ansi: bool) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(verbosity.is_verbose())
                .compact(),
        )
        .try_init();
}
