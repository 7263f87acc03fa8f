use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "checkin-pipeline.log";
const LOG_DIR_ENV: &str = "CHECKIN_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Get the log directory path
pub fn get_log_dir() -> Result<PathBuf> {
    resolve_log_dir()
}

/// Install the pipeline's tracing subscriber: an env-filtered registry
/// with a daily-rolling file layer. The returned guard must be held for
/// the lifetime of the host process so buffered lines are flushed.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn resolve_log_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(LOG_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let proj_dirs = ProjectDirs::from("app", "dailycheckin", "checkin-pipeline")
        .context("Failed to determine project directories for log path")?;

    Ok(proj_dirs.data_local_dir().join("logs"))
}

fn prune_old_logs(log_dir: &PathBuf, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let cutoff = SystemTime::now().checked_sub(max_age);
    let Some(cutoff) = cutoff else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let file_name = path.file_name().and_then(|name| name.to_str());
        let Some(file_name) = file_name else {
            continue;
        };

        if !file_name.starts_with(LOG_FILE_BASENAME) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        let Ok(modified) = metadata.modified() else {
            continue;
        };

        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}
