//! Tracing subscriber setup: `EnvFilter` plus a `fmt` layer whose output
//! format (pretty / compact / json) is chosen from config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Builds the filter from `RUST_LOG` when present, falling back to the
/// configured default directive (§ Environment: `RUST_LOG` is the one
/// conventional exception to "no magic env vars").
fn build_env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

pub fn init_tracing(logging: &LoggingConfig) {
    let filter = build_env_filter(logging);

    match logging.format {
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = tracing_subscriber::fmt::layer().compact();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }
}
