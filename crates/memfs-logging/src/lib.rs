// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by memfs binaries
//!
//! Engine crates only emit records through `tracing`; this crate decides
//! where those records go and which of them are kept.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-export clap for convenience when using CliLoggingArgs
pub use clap;

pub use tracing::Level;

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: {}. Use 'plaintext' or 'json'",
                s
            )),
        }
    }
}

/// Minimum severity of records that are kept
///
/// Parsing never fails: names are matched case-insensitively after trimming,
/// `warning` is accepted for `warn`, and anything unrecognised means `info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Treated as `error`; tracing has no separate fatal level
    Fatal,
}

impl LogLevel {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "fatal" => LogLevel::Fatal,
            _ => LogLevel::Info,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LogLevel::parse(s))
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error | LogLevel::Fatal => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Fatal => write!(f, "fatal"),
        }
    }
}

/// Logging flags shared by memfs binaries
///
/// Use with `#[command(flatten)]`. The level itself is not part of this
/// struct because it may also come from a configuration file.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    /// Log output format
    #[arg(long, value_enum, help = "Log output format (default: plaintext)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Log filename
    #[arg(long, help = "Append logs to this file instead of the console")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Initialize logging to the console, or to `--log-file` when given.
    pub fn init(&self, component: &str, level: LogLevel) -> anyhow::Result<()> {
        let format = self.log_format.unwrap_or_default();
        match self.resolve_log_path() {
            Some(path) => init_to_file(component, level.into(), format, &path),
            None => init(component, level.into(), format),
        }
    }

    /// Relative file names land in the standard log directory.
    fn resolve_log_path(&self) -> Option<PathBuf> {
        let log_file = Path::new(self.log_file.as_deref()?);
        if log_file.is_absolute() || log_file.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
            Some(log_file.to_path_buf())
        } else {
            let standard = get_standard_log_path();
            let dir = standard.parent().unwrap_or(Path::new("/tmp"));
            Some(dir.join(log_file))
        }
    }
}

/// Get the standard log file path for the current OS
///
/// - macOS: ~/Library/Logs/memfs.log
/// - Linux: ~/.local/share/memfs/memfs.log
/// - Other: ~/memfs.log (fallback)
pub fn get_standard_log_path() -> PathBuf {
    let home = || dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));

    let dir = if cfg!(target_os = "macos") {
        home().join("Library").join("Logs")
    } else if cfg!(target_os = "linux") {
        dirs::data_dir().unwrap_or_else(home).join("memfs")
    } else {
        home()
    };
    dir.join("memfs.log")
}

/// Initialize console logging
///
/// `RUST_LOG`, when set, takes precedence over `default_level`.
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stdout)
}

/// Initialize logging appended to `log_path`, creating its directory if needed.
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    init_with_writer(component, default_level, format, log_file)
}

/// Initialize logging with a custom writer
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    // RUST_LOG wins over the default level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},{component}={default_level}")));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(layer.json()).try_init()?,
        LogFormat::Plaintext => registry.with(layer).try_init()?,
    }
    Ok(())
}

/// Helpers for asserting on log output
#[cfg(feature = "test-utils")]
pub mod test_utils {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use tracing_subscriber::fmt::MakeWriter;

    /// An in-memory log sink that can be cloned into a subscriber and read back.
    #[derive(Clone, Debug, Default)]
    pub struct BufferWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Everything written so far, with ANSI colour codes removed.
        pub fn contents(&self) -> String {
            let bytes = self.lock().clone();
            strip_ansi_codes(&String::from_utf8_lossy(&bytes))
        }

        fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
            self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    pub struct BufferGuard<'a>(MutexGuard<'a, Vec<u8>>);

    impl Write for BufferGuard<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = BufferGuard<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            BufferGuard(self.lock())
        }
    }

    /// Strip ANSI escape sequences from a string
    pub fn strip_ansi_codes(s: &str) -> String {
        match regex::Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]") {
            Ok(ansi) => ansi.replace_all(s, "").to_string(),
            Err(_) => s.to_string(),
        }
    }
}
