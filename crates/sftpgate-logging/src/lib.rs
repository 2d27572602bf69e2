// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by sftpgate components
//!
//! Every component logs through `tracing`; this crate installs the global
//! subscriber (plaintext or JSON, console or file) and provides the session
//! span helpers the server wraps each connection in.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use clap;
pub use tracing::Level;

/// Crates whose targets get the configured level by default
const GATE_TARGETS: &[&str] = &["sftpgate_core", "sftpgate_server", "sftpgate_proto"];

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// One JSON object per event
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

/// Log level as accepted on the command line and in config files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Logging options, usable both as flattened clap arguments and as the
/// `[logging]` table of a server config file.
///
/// Without `log_file` or `log_dir` output goes to stdout.
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingArgs {
    /// Log verbosity level
    #[arg(long, value_enum, env = "SFTPGATE_LOG_LEVEL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Directory for log files
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log filename, relative to `log_dir` unless absolute
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl LoggingArgs {
    /// Fill every unset option from `fallback` (typically the config file)
    pub fn or(self, fallback: &LoggingArgs) -> Self {
        Self {
            log_level: self.log_level.or(fallback.log_level),
            log_format: self.log_format.or(fallback.log_format),
            log_dir: self.log_dir.or_else(|| fallback.log_dir.clone()),
            log_file: self.log_file.or_else(|| fallback.log_file.clone()),
        }
    }

    pub fn level(&self) -> Level {
        self.log_level.unwrap_or_default().into()
    }

    pub fn format(&self) -> LogFormat {
        self.log_format.unwrap_or_default()
    }

    pub fn logs_to_file(&self) -> bool {
        self.log_file.is_some() || self.log_dir.is_some()
    }

    /// Install the global subscriber described by these options
    pub fn init(&self, component: &str) -> anyhow::Result<()> {
        if self.logs_to_file() {
            init_to_file(component, self.level(), self.format(), &self.resolve_log_path(component))
        } else {
            init(component, self.level(), self.format())
        }
    }

    /// Where file output goes:
    /// an absolute `log_file` is used as is, a relative one is placed under
    /// `log_dir` when given, and with neither the platform default is used
    pub fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if file.is_absolute() => file.clone(),
            (Some(file), Some(dir)) => dir.join(file),
            (Some(file), None) => file.clone(),
            (None, Some(dir)) => dir.join(format!("{}.log", component)),
            (None, None) => standard_log_path(component),
        }
    }
}

/// Platform log location for `component`
///
/// - Linux: `~/.local/state/sftpgate/<component>.log`
/// - macOS: `~/Library/Logs/sftpgate/<component>.log`
/// - elsewhere: the data directory, falling back to `/tmp`
pub fn standard_log_path(component: &str) -> PathBuf {
    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|home| home.join("Library").join("Logs"));

    #[cfg(not(target_os = "macos"))]
    let base = dirs::state_dir().or_else(dirs::data_local_dir);

    base.unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sftpgate")
        .join(format!("{}.log", component))
}

/// Filter used when `RUST_LOG` is unset: warnings from dependencies,
/// `default_level` for the gate crates and the component itself
pub fn default_filter(component: &str, default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(component, default_level))
    })
}

fn default_directives(component: &str, level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    let component_target = component.replace('-', "_");
    for target in GATE_TARGETS
        .iter()
        .copied()
        .chain(std::iter::once(component_target.as_str()))
    {
        directives.push(format!("{}={}", target, level));
    }
    directives.join(",")
}

/// Initialize console logging
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stdout)
}

/// Initialize logging to a file, creating parent directories as needed
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    init_with_writer(component, default_level, format, std::sync::Mutex::new(log_file))
}

/// Initialize logging with a custom writer
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(format_layer(format, writer))
        .with(default_filter(component, default_level))
        .try_init()?;
    Ok(())
}

/// Formatting layer for `format`, without any filtering
pub fn format_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .json()
                .with_current_span(true);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);
            layer.boxed()
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);
            layer.boxed()
        }
    }
}

/// Redact sensitive values such as passwords from log output
///
/// ```rust
/// use sftpgate_logging::redact;
///
/// let password = "hunter2";
/// tracing::info!(password = %redact(password), "auth attempt");
/// ```
pub fn redact(_value: impl std::fmt::Display) -> &'static str {
    "[REDACTED]"
}

/// Span wrapping everything a connection does. The user field is filled in
/// once authentication succeeds.
pub fn session_span(remote: impl std::fmt::Display, client: &str) -> tracing::Span {
    tracing::info_span!(
        "sftp_session",
        remote = %remote,
        client = %client,
        user = tracing::field::Empty
    )
}

/// Extension for recording late-bound session fields
pub trait SessionSpanExt {
    fn record_user(&self, username: &str) -> &Self;
}

impl SessionSpanExt for tracing::Span {
    fn record_user(&self, username: &str) -> &Self {
        self.record("user", username);
        self
    }
}
