//! Logging bootstrap and log-line helpers for the lineage binaries.
//!
//! # Responsibility
//! - Start rolling file logs once per process for `lineage_server` and
//!   `lineage`.
//! - Keep `key=value` event lines parseable when they carry member ids.
//!
//! # Invariants
//! - Member names, emails and phones are never logged; ids and counts only.
//! - A panic is recorded by location and payload size, never by payload text.
//! - Re-initialization with a different level or directory is rejected.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "lineage";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_FIELD_CHARS: usize = 64;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    /// Directory is empty or relative.
    InvalidDirectory(PathBuf),
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(flexi_logger::FlexiLoggerError),
    /// Logging already runs with another level or directory.
    AlreadyInitialized {
        level: &'static str,
        log_dir: PathBuf,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(path) => {
                write!(f, "log_dir must be an absolute path, got `{}`", path.display())
            }
            Self::CreateDirectory { path, source } => {
                write!(f, "failed to create log directory `{}`: {source}", path.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyInitialized { level, log_dir } => write!(
                f,
                "logging already runs at level `{level}` in `{}`",
                log_dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

/// Starts file logging for `binary` at `level` under `log_dir`.
///
/// Calling again with the same level and directory is a no-op.
pub fn init_logging(binary: &str, level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let level = normalize_level(level)?;
    if log_dir.as_os_str().is_empty() || !log_dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(log_dir.to_path_buf()));
    }

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(binary, level, log_dir))?;
    if state.level != level || state.log_dir != log_dir {
        return Err(LoggingError::AlreadyInitialized {
            level: state.level,
            log_dir: state.log_dir.clone(),
        });
    }
    Ok(())
}

fn start_logger(
    binary: &str,
    level: &'static str,
    log_dir: &Path,
) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let logger = Logger::try_with_str(level)
        .map_err(LoggingError::Backend)?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    install_panic_hook();
    info!(
        "event=process_start module=logging status=ok binary={} level={level} version={} log_dir={}",
        field_value(binary),
        env!("CARGO_PKG_VERSION"),
        log_dir.display()
    );

    Ok(LoggingState {
        level,
        log_dir: log_dir.to_path_buf(),
        _logger: logger,
    })
}

/// Renders a member id (or other free text) as one `key=value` token.
///
/// Imported ids are kept verbatim, so they may contain spaces or `=`; those
/// become `_` and long values are cut.
pub fn field_value(value: &str) -> Cow<'_, str> {
    let clean = value
        .chars()
        .all(|ch| !(ch.is_whitespace() || ch.is_control() || ch == '='));
    if clean && value.chars().count() <= MAX_FIELD_CHARS {
        return Cow::Borrowed(value);
    }
    let mut rendered: String = value
        .chars()
        .take(MAX_FIELD_CHARS)
        .map(|ch| {
            if ch.is_whitespace() || ch.is_control() || ch == '=' {
                '_'
            } else {
                ch
            }
        })
        .collect();
    if value.chars().count() > MAX_FIELD_CHARS {
        rendered.push_str("...");
    }
    Cow::Owned(rendered)
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        _ => Err(LoggingError::UnsupportedLevel(level.trim().to_string())),
    }
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload_chars = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| message.chars().count())
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|message| message.chars().count())
            });
        error!(
            "event=panic_captured module=logging status=error location={location} payload_chars={}",
            payload_chars.map_or_else(|| "unknown".to_string(), |count| count.to_string())
        );
        previous_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::{field_value, init_logging, normalize_level, LoggingError};
    use std::borrow::Cow;
    use std::path::Path;

    #[test]
    fn levels_normalize_with_warning_alias() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert!(matches!(
            normalize_level("verbose"),
            Err(LoggingError::UnsupportedLevel(level)) if level == "verbose"
        ));
    }

    #[test]
    fn relative_directory_is_rejected_before_init() {
        let err = init_logging("lineage_test", "info", Path::new("logs/dev")).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidDirectory(_)));
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn field_value_keeps_plain_ids_and_escapes_the_rest() {
        assert!(matches!(field_value("M-42"), Cow::Borrowed("M-42")));
        assert_eq!(field_value("Mary Ann=1\n"), "Mary_Ann_1_");
        assert_eq!(field_value(""), "");

        let long = "x".repeat(80);
        let rendered = field_value(&long);
        assert_eq!(rendered.len(), 64 + 3);
        assert!(rendered.ends_with("..."));
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let other_dir = dir.path().join("other");

        init_logging("lineage_test", "info", &log_dir).unwrap();
        init_logging("lineage_test", "info", &log_dir).unwrap();

        let err = init_logging("lineage_test", "debug", &log_dir).unwrap_err();
        assert!(matches!(
            err,
            LoggingError::AlreadyInitialized { level: "info", .. }
        ));

        let err = init_logging("lineage_test", "info", &other_dir).unwrap_err();
        match err {
            LoggingError::AlreadyInitialized { log_dir: active, .. } => {
                assert_eq!(active, log_dir)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
