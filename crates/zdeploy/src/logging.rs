use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Error, Result};

const DEFAULT_FILTER: &str = "info";
pub const LOG_FILE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the process-wide stdout subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Log file of one configuration run.
///
/// While this value is alive, events on the current thread go to stdout and
/// to the file. Dropping it restores the previous subscriber.
pub struct RunLog {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLog {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Start `<logs_root>/<config_name>/<timestamp>.log`.
pub fn run_log(logs_root: &Path, config_name: &str) -> Result<RunLog> {
    let dir = logs_root.join(config_name);
    fs::create_dir_all(&dir)
        .map_err(|e| Error::io(format!("failed to create {}: {e}", dir.display())))?;
    let stamp = chrono::Local::now().format(LOG_FILE_TIME_FORMAT).to_string();
    let (path, file) = create_log_file(&dir, &stamp)?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        );
    let guard = tracing::subscriber::set_default(subscriber);
    Ok(RunLog {
        path,
        _guard: guard,
    })
}

// Two runs inside the same second get numbered files instead of sharing one.
fn create_log_file(dir: &Path, stamp: &str) -> Result<(PathBuf, File)> {
    let mut n = 0u32;
    loop {
        let name = if n == 0 {
            format!("{stamp}.log")
        } else {
            format!("{stamp} ({n}).log")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => {
                return Err(Error::io(format!(
                    "failed to create log file {}: {e}",
                    path.display()
                )));
            }
        }
    }
}
