//! Tracing setup.
//!
//! Console output goes to stderr from the start. The log file is attached
//! later through a reload handle, once the process runs as the service
//! identity, so the operator's identity never creates files in the data home.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};
use warden_shared::constants::layout;
use warden_shared::{WardenError, WardenResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Handle for attaching the file layer after start-up.
#[derive(Clone)]
pub struct LogHandle {
    file: reload::Handle<Option<BoxedLayer>, Registry>,
}

impl LogHandle {
    /// Start writing logs to `<logs_dir>/warden.log` as well.
    ///
    /// Keep the returned guard alive until exit; dropping it flushes the writer.
    pub fn attach_file(&self, logs_dir: &Path) -> WardenResult<WorkerGuard> {
        std::fs::create_dir_all(logs_dir).map_err(|e| {
            WardenError::Storage(format!(
                "failed to create logs dir {}: {}",
                logs_dir.display(),
                e
            ))
        })?;

        let appender = tracing_appender::rolling::never(logs_dir, layout::LOG_FILE);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(false)
            .boxed();

        self.file
            .reload(Some(layer))
            .map_err(|e| WardenError::Internal(format!("failed to attach log file: {}", e)))?;

        tracing::debug!(logs_dir = %logs_dir.display(), "Attached log file");
        Ok(guard)
    }
}

fn default_filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("warden=debug,warden_cli=debug");
    }
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warden=info,warden_cli=info"))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init_logging(debug: bool) -> LogHandle {
    let (file_layer, file) = reload::Layer::new(None::<BoxedLayer>);

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(default_filter(debug))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_file(false)
                .with_line_number(false),
        )
        .try_init();

    LogHandle { file }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_attach_file_creates_log() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");

        let handle = init_logging(false);
        let guard = handle.attach_file(&logs).unwrap();
        tracing::info!("written to file");
        drop(guard);

        assert!(logs.join(layout::LOG_FILE).exists());
    }
}
