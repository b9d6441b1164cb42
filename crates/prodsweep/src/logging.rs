use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log files are `prodsweep.<YYYY-MM-DD>.log`, one per day like the result
/// directories next to them
pub const LOG_PREFIX: &str = "prodsweep";
const LOG_SUFFIX: &str = "log";
/// Daily log files kept in the output directory
const MAX_LOG_FILES: usize = 14;

fn log_appender(log_dir: &Path) -> color_eyre::Result<RollingFileAppender> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)?;
    Ok(appender)
}

fn default_filter(level: &str) -> String {
    format!("prodsweep={level},prodsweep_core={level}")
}

/// Log to stderr and to a daily file in `log_dir`.
///
/// `RUST_LOG` takes precedence over `level` when set. File output goes through
/// a background writer; hold the returned guard until exit so it is flushed.
pub fn init_logging(log_dir: &Path, level: &str) -> color_eyre::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(log_appender(log_dir)?);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()?;

    tracing::debug!(log_dir = %log_dir.display(), "Logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_appender_writes_dated_file() {
        let dir = tempdir().unwrap();
        let mut appender = log_appender(dir.path()).unwrap();
        writeln!(appender, "sweep started").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("prodsweep."));
        assert!(names[0].ends_with(".log"));

        let content = std::fs::read_to_string(dir.path().join(&names[0])).unwrap();
        assert!(content.contains("sweep started"));
    }

    #[test]
    fn test_default_filter_covers_both_crates() {
        let filter = default_filter("debug");
        assert_eq!(filter, "prodsweep=debug,prodsweep_core=debug");
        assert!(filter.parse::<EnvFilter>().is_ok());
    }
}
