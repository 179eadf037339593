//! Harness logging.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

use crate::file_io::open_file_for_append;
use crate::Error;
use crate::ObservabilityConfig;
use crate::Result;

const LOG_FILE: &str = "dtest.log";

/// Installs the global subscriber. `RUST_LOG` overrides the configured filter.
///
/// With a `log_dir`, records go through a non-blocking writer to
/// `<log_dir>/dtest.log`; keep the returned guard alive until exit or the tail
/// of the log is lost.
pub fn init_observability(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Fatal(format!("invalid log filter: {e}")))?;

    let (layer, guard) = match &config.log_dir {
        Some(dir) => {
            let log_file = open_file_for_append(dir.join(LOG_FILE))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter)
                .boxed();
            (layer, Some(guard))
        }
        None => (tracing_subscriber::fmt::layer().with_filter(filter).boxed(), None),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| Error::Fatal(format!("logging already initialized: {e}")))?;
    Ok(guard)
}
