use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Logs go to stderr, or to `log_file` when
/// given; stdout stays free for chat output. Keep the returned guard alive
/// until exit so buffered file lines are flushed.
pub fn init_tracing(filter: &str, log_file: Option<&Path>) -> std::io::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            Registry::default().with(env_filter).with(fmt_layer).init();
            Ok(Some(guard))
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            Registry::default().with(env_filter).with(fmt_layer).init();
            Ok(None)
        }
    }
}
