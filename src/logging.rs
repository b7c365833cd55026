//! Logging and tracing infrastructure for pescan.
//!
//! Logs go to stderr so that stdout only carries analysis output. The
//! filter comes from `RUST_LOG` when set, otherwise from the verbosity the
//! user asked for on the command line.

use std::sync::Once;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Map a `-v` count to a default filter directive.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)))
}

/// Initialize the global tracing subscriber.
///
/// This should be called once at program startup.
/// Subsequent calls are ignored.
pub fn init_tracing(verbosity: u8) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbosity > 1)
            .with_file(verbosity > 2)
            .with_line_number(verbosity > 2);

        tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(fmt_layer)
            .init();

        debug!("pescan tracing initialized");
    });
}

/// Initialize tracing with JSON output for structured logging.
pub fn init_tracing_json(verbosity: u8) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true);

        tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(fmt_layer)
            .init();

        debug!("pescan tracing initialized (JSON mode)");
    });
}
