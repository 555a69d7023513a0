use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the env filter for the chosen verbosity
pub fn env_filter(debug: bool, quiet: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("llm_router=debug")
    } else if quiet {
        EnvFilter::new("llm_router=error")
    } else {
        EnvFilter::new("llm_router=info")
    }
}

/// Initialize logging based on output mode and debug flag
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole program.
pub fn init_logging(
    debug: bool,
    quiet: bool,
    log_file: Option<PathBuf>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    if let Some(log_path) = log_file {
        let (dir, filename) = split_log_path(&log_path)?;
        std::fs::create_dir_all(&dir)?;

        let appender = tracing_appender::rolling::never(dir, filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_line_number(true)
            .with_file(true);

        tracing_subscriber::registry()
            .with(env_filter(debug, quiet))
            .with(fmt_layer)
            .with(file_layer)
            .init();

        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter(debug, quiet))
            .with(fmt_layer)
            .init();

        Ok(None)
    }
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let filename = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, PathBuf::from(filename)))
}

/// Get default log file path for the current run
pub fn default_log_path() -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("llm-router")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let filename = format!("router-{}.log", timestamp);

    Ok(log_dir.join(filename))
}
