// ── Tracing subscriber setup ──
//
// For the embedding shell. A GUI shell should log to a file so nothing
// lands on a terminal it doesn't own.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{ConfigError, Logging};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `settings`.
///
/// `RUST_LOG` wins over `settings.level`. When logging to a file the
/// returned guard must be held for the life of the process so buffered
/// lines are flushed.
pub fn init(settings: &Logging) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| ConfigError::Validation {
            field: "logging.level".into(),
            reason: e.to_string(),
        })?;

    let (layer, guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (fmt_layer(writer, settings.json, false), Some(guard))
        }
        None => (fmt_layer(std::io::stderr, settings.json, true), None),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), ConfigError> {
    let file_name = path.file_name().ok_or_else(|| ConfigError::Validation {
        field: "logging.file".into(),
        reason: format!("{} has no file name", path.display()),
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn fmt_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    if json { layer.json().boxed() } else { layer.boxed() }
}
