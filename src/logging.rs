//! Structured logging for the geotagging utilities
//!
//! Provides context-rich logging with subsystem tags, optional bag
//! identifiers, timestamps, and severity levels. Supports both console output
//! and a free-running log file (`data_processing.log` by default) that keeps
//! API timings and failures across runs.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogLevel {
    /// Parses the level names accepted in `geotag.toml` (case-insensitive).
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Subsystem Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Metadata,
    Geocoder,
    Land,
    Ledger,
    Dashboard,
    System,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Metadata => write!(f, "META"),
            Source::Geocoder => write!(f, "GEO"),
            Source::Land => write!(f, "LAND"),
            Source::Ledger => write!(f, "CSV"),
            Source::Dashboard => write!(f, "DASH"),
            Source::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the service simply has nothing for this key
    Expected,
    /// Unexpected failure - service degradation, throttling, or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut guard) = LOGGER.lock() {
            *guard = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, source: Source, md5: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = format_entry(level, source, md5, message);
        let md5_part = md5.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", source, md5_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", source, md5_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {}
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// `2024-05-01 12:00:00 - INFO - GEO [md5]: message`
fn format_entry(level: LogLevel, source: Source, md5: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
    let md5_part = md5.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{} - {} - {}{}: {}", timestamp, level, source, md5_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, source: Source, md5: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, source, md5, message);
        }
    }
}

/// Log a general informational message
pub fn info(source: Source, md5: Option<&str>, message: &str) {
    emit(LogLevel::Info, source, md5, message);
}

/// Log a warning message
pub fn warn(source: Source, md5: Option<&str>, message: &str) {
    emit(LogLevel::Warning, source, md5, message);
}

/// Log an error message
pub fn error(source: Source, md5: Option<&str>, message: &str) {
    emit(LogLevel::Error, source, md5, message);
}

/// Log a debug message
pub fn debug(source: Source, md5: Option<&str>, message: &str) {
    emit(LogLevel::Debug, source, md5, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a remote-service failure from its rendered error message.
pub fn classify_failure(error_message: &str) -> FailureType {
    if error_message.contains("HTTP error: 404") || error_message.contains("No record") {
        FailureType::Expected
    }
    // Throttling and server errors mean the service itself is unhappy
    else if error_message.contains("HTTP error: 429")
        || error_message.contains("HTTP error: 5")
        || error_message.contains("timed out")
    {
        FailureType::Unexpected
    }
    // Parse errors suggest API changes
    else if error_message.contains("Parse error") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a fetch failure with automatic classification
pub fn log_fetch_failure(source: Source, md5: Option<&str>, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(source, md5, &message),
        FailureType::Unexpected => error(source, md5, &message),
        FailureType::Unknown => warn(source, md5, &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batch run
pub fn log_run_summary(total: usize, valid: usize, invalid: usize, unavailable: usize) {
    let message = format!(
        "Run complete: {}/{} logged ({} valid, {} invalid), {} without metadata",
        valid + invalid,
        total,
        valid,
        invalid,
        unavailable
    );

    if unavailable == 0 {
        info(Source::System, None, &message);
    } else if valid + invalid == 0 {
        error(Source::System, None, &message);
    } else {
        warn(Source::System, None, &message);
    }
}
