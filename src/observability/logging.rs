//! Logging configuration.

use std::path::PathBuf;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn,barangay=info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `BARANGAY_LOG` | Filter directive |
    /// | `BARANGAY_LOG_FORMAT` | `pretty` or `json` |
    /// | `BARANGAY_LOG_FILE` | Log file path |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("BARANGAY_LOG")
            && !v.trim().is_empty()
        {
            self.filter = v;
        }
        if let Ok(v) = std::env::var("BARANGAY_LOG_FORMAT")
            && let Some(format) = LogFormat::parse(&v)
        {
            self.format = format;
        }
        if let Ok(v) = std::env::var("BARANGAY_LOG_FILE")
            && !v.trim().is_empty()
        {
            self.file = Some(PathBuf::from(v));
        }
        self
    }

    /// Raises the crate's level to debug.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.filter = format!("{},barangay=debug", self.filter);
        }
        self
    }
}
