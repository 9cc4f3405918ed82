//! Configuration management.
//!
//! Configuration comes from a TOML file, then environment overrides:
//!
//! ```toml
//! [storage]
//! backend = "redis"
//! redis_url = "redis://localhost:6379"
//! namespace = "barangay"
//!
//! [resilience]
//! breaker_failure_threshold = 5
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [reconcile]
//! enabled = true
//! interval_secs = 300
//! prune_orphans = true
//! ```

use crate::observability::{LogFormat, LoggingConfig};
use crate::reconcile::ReconcileConfig;
use crate::storage::{DEFAULT_NAMESPACE, KeySpace, StoreResilienceConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "BARANGAY_CONFIG_PATH";

/// Available store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackendType {
    /// Process-local store.
    #[default]
    Memory,
    /// Redis server.
    Redis,
}

impl StorageBackendType {
    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

/// Store connection settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackendType,
    /// Redis connection URL.
    pub redis_url: String,
    /// Key namespace.
    pub namespace: String,
    /// Circuit breaker settings.
    pub resilience: StoreResilienceConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            resilience: StoreResilienceConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Key space for the configured namespace.
    #[must_use]
    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.namespace.clone())
    }
}

/// Main configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Store settings.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Counter reconciliation settings.
    pub reconcile: ReconcileConfig,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Resilience section.
    pub resilience: Option<StoreResilienceConfig>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Reconcile section.
    pub reconcile: Option<ConfigFileReconcile>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Backend name: "memory" or "redis".
    pub backend: Option<String>,
    /// Redis URL.
    pub redis_url: Option<String>,
    /// Key namespace.
    pub namespace: Option<String>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive, e.g. "info" or "barangay=debug".
    pub level: Option<String>,
    /// "pretty" or "json".
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// Reconcile section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileReconcile {
    /// Run the periodic job.
    pub enabled: Option<bool>,
    /// Seconds between runs.
    pub interval_secs: Option<u64>,
    /// Delete orphan hashes and dangling set entries.
    pub prune_orphans: Option<bool>,
}

impl RegistryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown backend or log format.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<platform config dir>/barangay/config.toml`, then
    /// `~/.config/barangay/config.toml`. Returns defaults if neither exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Ok(Self::default());
        };

        let candidates = [
            base_dirs.config_dir().join("barangay").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("barangay")
                .join("config.toml"),
        ];

        for path in candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Resolves configuration from an explicit path, `BARANGAY_CONFIG_PATH`,
    /// or the default location, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected file is missing or invalid.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let config = if let Some(path) = path {
            Self::load_from_file(path)?
        } else if let Some(path) = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
        {
            Self::load_from_file(&PathBuf::from(path))?
        } else {
            Self::load_default()?
        };

        config.with_env_overrides()
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `BARANGAY_BACKEND` | storage backend |
    /// | `BARANGAY_REDIS_URL` | Redis URL |
    /// | `BARANGAY_NAMESPACE` | key namespace |
    /// | `BARANGAY_STORE_BREAKER_*` | circuit breaker |
    /// | `BARANGAY_LOG*` | logging |
    /// | `BARANGAY_RECONCILE_*` | reconciliation |
    ///
    /// # Errors
    ///
    /// Returns an error if `BARANGAY_BACKEND` names an unknown backend.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("BARANGAY_BACKEND") {
            self.storage.backend = parse_backend(&v)?;
        }
        if let Ok(v) = std::env::var("BARANGAY_REDIS_URL")
            && !v.trim().is_empty()
        {
            self.storage.redis_url = v;
        }
        if let Ok(v) = std::env::var("BARANGAY_NAMESPACE")
            && !v.trim().is_empty()
        {
            self.storage.namespace = v;
        }
        self.storage.resilience = self.storage.resilience.with_env_overrides();
        self.logging = self.logging.with_env_overrides();
        self.reconcile = self.reconcile.with_env_overrides();
        Ok(self)
    }

    /// Converts a `ConfigFile` to `RegistryConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(storage) = file.storage {
            if let Some(backend) = storage.backend {
                config.storage.backend = parse_backend(&backend)?;
            }
            if let Some(url) = storage.redis_url {
                config.storage.redis_url = url;
            }
            if let Some(namespace) = storage.namespace {
                config.storage.namespace = namespace;
            }
        }
        if let Some(resilience) = file.resilience {
            config.storage.resilience = resilience;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.filter = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format).ok_or_else(|| {
                    Error::InvalidInput(format!("unknown log format: {format}"))
                })?;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }
        if let Some(reconcile) = file.reconcile {
            if let Some(enabled) = reconcile.enabled {
                config.reconcile.enabled = enabled;
            }
            if let Some(secs) = reconcile.interval_secs {
                config.reconcile.interval_secs = secs.max(1);
            }
            if let Some(prune) = reconcile.prune_orphans {
                config.reconcile.prune_orphans = prune;
            }
        }

        Ok(config)
    }

    /// Sets the storage backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: StorageBackendType) -> Self {
        self.storage.backend = backend;
        self
    }

    /// Sets the key namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage.namespace = namespace.into();
        self
    }
}

fn parse_backend(value: &str) -> Result<StorageBackendType> {
    StorageBackendType::parse(value)
        .ok_or_else(|| Error::InvalidInput(format!("unknown storage backend: {value}")))
}
