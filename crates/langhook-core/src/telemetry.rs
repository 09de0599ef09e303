//! Structured logging setup.
//!
//! No OTLP exporter is wired up — there's no collector in scope for this
//! service — just an `EnvFilter` plus a `fmt` layer, switching between
//! pretty and JSON output per [`crate::config::LogFormat`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat};
use crate::error::Error;

/// Initialize the global tracing subscriber from `config.log_format`,
/// honoring `RUST_LOG` for filtering.
pub fn init(config: &Config) -> Result<(), Error> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    result.map_err(|e| Error::Config(format!("failed to initialize tracing subscriber: {e}")))
}
