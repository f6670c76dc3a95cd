//! Log routing for a single CLI run.
//!
//! stdout is reserved for the report, so logs go to a file when one can be
//! opened and to stderr otherwise. `RUST_LOG` overrides the `-v` level.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use modelsmith_config::ModelsmithConfig;

/// Default filter directive for the number of `-v` flags given.
#[must_use]
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// `~/.modelsmith/logs/modelsmith.log`, next to the config file.
#[must_use]
pub fn default_log_path() -> Option<PathBuf> {
    let config = ModelsmithConfig::path()?;
    Some(config.parent()?.join("logs").join("modelsmith.log"))
}

/// Open `path` for appending, creating missing parent directories.
pub fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn init(verbose: u8, log_file: Option<PathBuf>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbose)));

    let target = log_file.or_else(default_log_path);
    let opened = target.as_deref().map(|path| (path, open_append(path)));

    match opened {
        Some((path, Ok(file))) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
            tracing::debug!(path = %path.display(), "Logging to file");
        }
        Some((path, Err(e))) => {
            init_stderr(filter);
            tracing::warn!(path = %path.display(), "Cannot open log file, using stderr: {e}");
        }
        None => init_stderr(filter),
    }
}

fn init_stderr(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}
