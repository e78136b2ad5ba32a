use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directory for daily rolling log files; stderr only when unset.
pub const LOG_DIR_ENV: &str = "CLOUDCOST_LOG_DIR";

const LOG_FILE_PREFIX: &str = "cloudcost.log";

/// Installs the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Keep the returned guard alive until exit so file logs are flushed.
pub fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir.trim(), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_target(true).with_writer(writer);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();

    guard
}

/// Debug-level output captured by the test harness (only once per binary).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_target(true)
        .with_level(true)
        .with_test_writer()
        .try_init();
}
