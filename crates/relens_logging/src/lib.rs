//! Shared logging setup for Relens binaries.
//!
//! Two layers: a size-rotated file under the app home and stderr. Filtering
//! comes from `RUST_LOG` when set, otherwise a default that keeps the engine
//! crates at info.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "relens=info,relens_engine=info,relens_db=info";
const MAX_ROTATED_FILES: usize = 4;
const MAX_LOG_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// Home directory for Relens state: ~/.relens (RELENS_HOME overrides).
pub fn relens_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("RELENS_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relens")
}

/// Logs directory: ~/.relens/logs.
pub fn logs_dir() -> PathBuf {
    relens_home().join("logs")
}

/// Initialize tracing with a rotating file layer and a stderr layer.
///
/// `verbose` raises the stderr layer to the file layer's filter; otherwise
/// stderr only shows warnings so job output stays readable.
pub fn init_logging(app_name: &str, verbose: bool) -> Result<()> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let writer = RotatingLog::open(dir, app_name)
        .context("Failed to open rotating log file")?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .init();

    Ok(())
}

struct LogFileState {
    dir: PathBuf,
    base_name: String,
    file: File,
    written: u64,
}

impl LogFileState {
    fn current_path(dir: &PathBuf, base_name: &str) -> PathBuf {
        dir.join(format!("{}.log", base_name))
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    /// Shift {name}.log -> {name}.log.1 -> ... and reopen a fresh file.
    fn rotate(&mut self) -> io::Result<()> {
        let _ = self.file.flush();

        let oldest = self.rotated_path(MAX_ROTATED_FILES);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..MAX_ROTATED_FILES).rev() {
            let src = self.rotated_path(index);
            if src.exists() {
                fs::rename(&src, self.rotated_path(index + 1))?;
            }
        }

        let current = Self::current_path(&self.dir, &self.base_name);
        if current.exists() {
            fs::rename(&current, self.rotated_path(1))?;
        }

        self.file = OpenOptions::new().create(true).append(true).open(current)?;
        self.written = 0;
        Ok(())
    }

    fn write_all_rotating(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let bytes = self.file.write(buf)?;
        self.written += bytes as u64;
        Ok(bytes)
    }
}

/// Size-rotated log file shared across tracing's worker contexts.
#[derive(Clone)]
pub struct RotatingLog {
    state: Arc<Mutex<LogFileState>>,
}

impl RotatingLog {
    fn open(dir: PathBuf, base_name: &str) -> Result<Self> {
        let base_name = sanitize_name(base_name);
        let path = LogFileState::current_path(&dir, &base_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            state: Arc::new(Mutex::new(LogFileState {
                dir,
                base_name,
                file,
                written,
            })),
        })
    }
}

pub struct RotatingLogGuard {
    state: Arc<Mutex<LogFileState>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingLog {
    type Writer = RotatingLogGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingLogGuard {
            state: Arc::clone(&self.state),
        }
    }
}

impl Write for RotatingLogGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log lock poisoned"))?;
        state.write_all_rotating(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log lock poisoned"))?;
        state.file.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
