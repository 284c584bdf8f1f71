//! Global `tracing` subscriber setup.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable read for filter directives before `RUST_LOG`.
pub const LOG_ENV: &str = "TRAY_SESSION_LOG";

#[cfg_attr(debug_assertions, allow(dead_code))]
const LOG_RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 30);

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::DEBUG.into())
            .from_env_lossy()
    })
}

/// Installs the global subscriber.
///
/// Release builds also log to a daily file under the data directory; the
/// returned guard flushes it and must outlive every log call.
pub fn init() -> anyhow::Result<Option<WorkerGuard>> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(tracing::Level::TRACE)
        .with_target(false)
        .with_env_filter(env_filter())
        .finish();

    install(subscriber)
}

#[cfg(debug_assertions)]
fn install<S>(subscriber: S) -> anyhow::Result<Option<WorkerGuard>>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(None)
}

#[cfg(not(debug_assertions))]
fn install<S>(subscriber: S) -> anyhow::Result<Option<WorkerGuard>>
where
    S: tracing::Subscriber
        + for<'a> tracing_subscriber::registry::LookupSpan<'a>
        + Send
        + Sync
        + 'static,
{
    use anyhow::Context;
    use tracing_subscriber::layer::SubscriberExt;

    let logs_dir = dirs::data_dir()
        .context("Failed to get $data_dir path")?
        .join(env!("CARGO_PKG_NAME"))
        .join("logs");

    let pruned = prune_old_logs(&logs_dir, SystemTime::now(), LOG_RETENTION);

    let appender = tracing_appender::rolling::daily(&logs_dir, "tray-session.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::Layer::default()
        .with_ansi(false)
        .with_writer(writer);

    tracing::subscriber::set_global_default(subscriber.with(file_layer))?;

    tracing::debug!("Logging to {} ({pruned} stale files removed)", logs_dir.display());

    Ok(Some(guard))
}

/// Deletes files in `dir` last modified more than `max_age` before `now`.
/// Returns how many were removed; a missing directory removes nothing.
#[cfg_attr(debug_assertions, allow(dead_code))]
pub fn prune_old_logs(dir: &Path, now: SystemTime, max_age: Duration) -> usize {
    let mut removed = 0;

    for entry in std::fs::read_dir(dir).ok().into_iter().flatten() {
        let Ok(entry) = entry else {
            continue;
        };
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }

    removed
}
