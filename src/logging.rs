//! Log verbosity and the per-run file sink
//!
//! Verbosity levels are ordered most verbose first, so the effective level
//! of a run is the `min` of the requested and the configured level.

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::subscriber::DefaultGuard;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogVerbosity {
    All,
    Io,
    Status,
    #[default]
    Init,
    Note,
    Warning,
    Error,
    Fatal,
    Off,
}

impl LogVerbosity {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::All | Self::Io => LevelFilter::TRACE,
            Self::Status => LevelFilter::DEBUG,
            Self::Init | Self::Note => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Fatal => LevelFilter::ERROR,
            Self::Off => LevelFilter::OFF,
        }
    }

    /// Verbosity a run logs at. An unknown request (`None`) counts as `Off`.
    pub fn effective(requested: Option<LogVerbosity>, configured: LogVerbosity) -> LogVerbosity {
        requested.unwrap_or(LogVerbosity::Off).min(configured)
    }
}

impl fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Io => "io",
            Self::Status => "status",
            Self::Init => "init",
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

/// Install a global fmt subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(verbosity: LogVerbosity) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(verbosity.level_filter().into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// File sink attached to the running thread for the duration of one run.
pub struct RunLogSink {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLogSink {
    /// Start writing this thread's events to `path`. A file that cannot be
    /// opened is reported and the run continues without the sink.
    pub fn attach(path: &Path, verbosity: LogVerbosity) -> Option<Self> {
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open process log file");
                return None;
            }
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_max_level(verbosity.level_filter())
            .finish();
        Some(Self {
            path: path.to_path_buf(),
            _guard: tracing::subscriber::set_default(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn detach(self) {}
}

impl fmt::Debug for RunLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLogSink").field("path", &self.path).finish()
    }
}
