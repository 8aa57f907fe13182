use serde::Deserialize;
use std::time::Duration;

use backon::ExponentialBuilder;

use crate::error::{LoaderError, Result};
use crate::types::IndexParams;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "INDEX_LOADER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub index: IndexParams,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            request_timeout_secs: 60,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            retry_min_delay_ms: 200,
            retry_max_delay_ms: 5_000,
            retry_jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Backoff policy for chunk requests that fail at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl From<&RetryOptions> for ExponentialBuilder {
    fn from(options: &RetryOptions) -> Self {
        let mut builder = ExponentialBuilder::default()
            .with_max_times(options.max_retries)
            .with_min_delay(options.min_delay)
            .with_max_delay(options.max_delay);
        if options.jitter {
            builder = builder.with_jitter();
        }
        builder
    }
}

/// Runtime knobs of an [`crate::loader::IndexLoader`] beyond the inbound
/// `configure` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryOptions,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            retry: RetryOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (explicit `path`, or
    /// `INDEX_LOADER_CONFIG`), then `INDEX_LOADER_*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

        let mut config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(&p)?;
                Self::from_toml(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: Option<String>, slot: &mut T) {
            if let Some(v) = value {
                match v.parse() {
                    Ok(parsed) => *slot = parsed,
                    Err(_) => tracing::warn!(key, value = %v, "ignoring unparseable override"),
                }
            }
        }

        if let Some(v) = lookup("INDEX_LOADER_URL") {
            self.database.url = v;
        }
        parse(
            "INDEX_LOADER_REQUEST_TIMEOUT_SECS",
            lookup("INDEX_LOADER_REQUEST_TIMEOUT_SECS"),
            &mut self.database.request_timeout_secs,
        );
        parse(
            "INDEX_LOADER_BATCH_SIZE",
            lookup("INDEX_LOADER_BATCH_SIZE"),
            &mut self.upload.batch_size,
        );
        parse(
            "INDEX_LOADER_MAX_RETRIES",
            lookup("INDEX_LOADER_MAX_RETRIES"),
            &mut self.upload.max_retries,
        );
        if let Some(v) = lookup("INDEX_LOADER_CLASS_NAME") {
            self.index.class_name = v;
        }
        if let Some(v) = lookup("INDEX_LOADER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("INDEX_LOADER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(LoaderError::Config("database.url must not be empty".into()));
        }
        if self.database.request_timeout_secs == 0 || self.database.connect_timeout_secs == 0 {
            return Err(LoaderError::Config("timeouts must be positive".into()));
        }
        if self.upload.batch_size == 0 {
            return Err(LoaderError::Config("upload.batch_size must be positive".into()));
        }
        if self.upload.retry_min_delay_ms > self.upload.retry_max_delay_ms {
            return Err(LoaderError::Config(
                "upload.retry_min_delay_ms exceeds retry_max_delay_ms".into(),
            ));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(LoaderError::Config(format!("unknown log format: {other}"))),
        }
    }

    /// Index build parameters with the configured class name.
    pub fn index_params(&self) -> IndexParams {
        self.index.clone()
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            request_timeout: Duration::from_secs(self.database.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.database.connect_timeout_secs),
            retry: RetryOptions {
                max_retries: self.upload.max_retries,
                min_delay: Duration::from_millis(self.upload.retry_min_delay_ms),
                max_delay: Duration::from_millis(self.upload.retry_max_delay_ms),
                jitter: self.upload.retry_jitter,
            },
        }
    }
}
