use std::sync::Once;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Log rendering used by [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output for local runs.
    Pretty,
    /// One JSON object per line for log collectors.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter is taken from `RUST_LOG` when set and falls back to `default_directive`
/// otherwise. Every event carries the `app` name so that logs of several dumpers can be
/// told apart.
pub fn init_tracing(
    app: &'static str,
    default_directive: &str,
    format: LogFormat,
) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init()?,
    }

    tracing::info!(app, ?format, "tracing initialized");

    Ok(())
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs a subscriber that writes through the test harness, once per process.
///
/// Set `ENABLE_TRACING=1` to see logs from tests, filtered by `RUST_LOG` (default `info`).
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_err() {
            return;
        }

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}
