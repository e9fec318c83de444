//! Log sink selection and runtime log-level control
//!
//! The filter sits behind a `reload` layer so the active level can be
//! changed while running. The level file accepts level names or the
//! numeric values used by the rest of the hw-management suite.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use tc_core::constants::paths;

pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Level used when nothing else is configured
pub const DEFAULT_LEVEL: &str = "info";

/// Environment variable overriding the initial level
pub const LEVEL_ENV: &str = "HW_THERMAL_LOG";

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Journald,
    Stdout,
}

impl Sink {
    pub fn describe(&self) -> &'static str {
        match self {
            Sink::Journald => "systemd journal",
            Sink::Stdout => "stdout",
        }
    }
}

/// Map a level name or numeric value to a filter directive
pub fn parse_level(text: &str) -> Option<&'static str> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u32>() {
        return match n {
            10 => Some("debug"),
            20 => Some("info"),
            30 => Some("warn"),
            40 | 50 => Some("error"),
            _ => None,
        };
    }
    match text.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" | "notice" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// Read and parse the level file; `None` when missing or not understood
pub fn read_level_file(path: &Path) -> Option<&'static str> {
    let content = fs::read_to_string(path).ok()?;
    parse_level(&content)
}

/// Initial filter: argument, environment, level file, then the default
///
/// Arguments and the environment may also carry a full filter directive
/// such as `tc_core=debug`.
pub fn initial_level(arg: Option<&str>, env: Option<&str>, file: &Path) -> String {
    for candidate in [arg, env].into_iter().flatten() {
        if let Some(level) = parse_level(candidate) {
            return level.to_string();
        }
        if EnvFilter::try_new(candidate).is_ok() {
            return candidate.to_string();
        }
        eprintln!("Ignoring invalid log level '{}'", candidate);
    }
    read_level_file(file).unwrap_or(DEFAULT_LEVEL).to_string()
}

/// Owner of the active log level
#[derive(Debug)]
pub struct LogControl {
    handle: Option<ReloadHandle>,
    level: String,
    level_file: PathBuf,
}

impl LogControl {
    /// Install the global subscriber
    ///
    /// Journald is used when its socket exists, stdout otherwise.
    pub fn init(level: &str, level_file: PathBuf) -> (Self, Sink) {
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
        let (filter, handle) = reload::Layer::new(filter);

        let journald = if Path::new(paths::JOURNAL_SOCKET).exists() {
            match tracing_journald::layer() {
                Ok(layer) => Some(layer),
                Err(e) => {
                    eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                    None
                }
            }
        } else {
            None
        };
        let sink = if journald.is_some() { Sink::Journald } else { Sink::Stdout };
        let stdout = journald.is_none().then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
        });

        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(journald)
            .with(stdout)
            .try_init()
        {
            eprintln!("Failed to install log subscriber: {}", e);
        }

        let control = Self {
            handle: Some(handle),
            level: level.to_string(),
            level_file,
        };
        (control, sink)
    }

    /// Level bookkeeping without a subscriber
    pub fn detached(level: &str, level_file: PathBuf) -> Self {
        Self {
            handle: None,
            level: level.to_string(),
            level_file,
        }
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Switch the active filter; returns whether the level changed
    pub fn set_level(&mut self, level: &str) -> bool {
        if level == self.level {
            return false;
        }
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(level)) {
                warn!("Failed to reload log level: {}", e);
                return false;
            }
        }
        info!("Log level changed: {} -> {}", self.level, level);
        self.level = level.to_string();
        true
    }

    /// Re-read the level file and apply it
    ///
    /// A missing or unreadable file keeps the current level.
    pub fn reload_from_file(&mut self) -> bool {
        let content = match fs::read_to_string(&self.level_file) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Cannot read log level file {}: {}, keeping {}",
                    self.level_file.display(),
                    e,
                    self.level
                );
                return false;
            }
        };
        match parse_level(&content) {
            Some(level) => self.set_level(level),
            None => {
                warn!(
                    "Unknown log level '{}' in {}, keeping {}",
                    content.trim(),
                    self.level_file.display(),
                    self.level
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level_names_and_numbers() {
        assert_eq!(parse_level("DEBUG\n"), Some("debug"));
        assert_eq!(parse_level("notice"), Some("info"));
        assert_eq!(parse_level("warning"), Some("warn"));
        assert_eq!(parse_level("critical"), Some("error"));
        assert_eq!(parse_level("20"), Some("info"));
        assert_eq!(parse_level("30"), Some("warn"));
        assert_eq!(parse_level("50"), Some("error"));
        assert_eq!(parse_level("15"), None);
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_initial_level_precedence() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("level");
        fs::write(&file, "10").unwrap();

        assert_eq!(initial_level(Some("error"), Some("warn"), &file), "error");
        assert_eq!(initial_level(None, Some("warn"), &file), "warn");
        assert_eq!(initial_level(None, None, &file), "debug");
        assert_eq!(initial_level(None, None, &dir.path().join("missing")), DEFAULT_LEVEL);
        assert_eq!(initial_level(Some("tc_core=trace"), None, &file), "tc_core=trace");
    }

    #[test]
    fn test_reload_from_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("level");
        let mut log = LogControl::detached("info", file.clone());

        // Missing file keeps the level
        assert!(!log.reload_from_file());
        assert_eq!(log.level(), "info");

        fs::write(&file, "debug\n").unwrap();
        assert!(log.reload_from_file());
        assert_eq!(log.level(), "debug");

        // Unchanged
        assert!(!log.reload_from_file());

        fs::write(&file, "very loud").unwrap();
        assert!(!log.reload_from_file());
        assert_eq!(log.level(), "debug");
    }
}
