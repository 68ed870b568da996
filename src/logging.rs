use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

/// Filter from an explicit directive, else `RUST_LOG`, else the default level.
pub fn build_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Log to stderr. Used by the one-shot CLI subcommands.
pub fn init_stderr(directive: Option<&str>) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(directive))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Log to `path`, appending. The console owns the terminal, so nothing may
/// be written to stderr while it runs.
pub fn init_file(directive: Option<&str>, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(directive))
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .compact();

    let _ = subscriber.try_init();
    Ok(())
}
