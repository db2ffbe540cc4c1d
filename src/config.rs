//! Configuration system for the persona pipeline
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PERSONA_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::backend::ApiCredential;
use crate::error::{Error, Result};
use crate::types::Namespace;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model API connection
    pub model: ModelSettings,

    /// Retry and backoff policy for model calls
    pub retry: RetrySettings,

    /// Persona generation pacing and chunking
    pub generation: GenerationSettings,

    /// Copy scoring pacing
    pub scoring: ScoringSettings,

    /// Output locations
    pub storage: StorageSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Which transport answers model calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible chat-completions endpoint
    Openai,
    /// Offline responder, used for dry runs and tests
    Mock,
}

/// Model API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Transport to use
    pub provider: ProviderKind,

    /// API base URL (the `/chat/completions` path is appended)
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// API key; prefer PERSONA_API_KEY over writing it to disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Absolute wall-clock limit per model call, in seconds
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: f32,
}

/// Retry policy for a single logical model call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per call, including the first
    pub max_attempts: u32,

    /// Added on top of an API-suggested retry delay
    pub rate_limit_margin_secs: u64,

    /// Wait used when a rate limit carries no usable delay hint
    pub default_rate_limit_wait_secs: u64,

    /// Upper bound on an API-suggested retry delay
    pub max_rate_limit_wait_secs: u64,

    /// First transient-failure backoff
    pub backoff_floor_secs: u64,

    /// Largest transient-failure backoff
    pub backoff_ceiling_secs: u64,
}

/// Persona generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Characters per chunk when a document is batched
    pub chunk_size: usize,

    /// Documents estimated above this many tokens are chunked
    pub batching_threshold_tokens: usize,

    /// Unchunked documents estimated above this many tokens are rejected
    pub max_estimated_tokens: usize,

    /// Pause between chunks, in seconds
    pub chunk_delay_secs: u64,

    /// Per-namespace pause overrides, e.g. `csv2 = 20`
    pub chunk_delay_overrides: BTreeMap<String, u64>,
}

/// Copy scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Personas per batch
    pub batch_size: usize,

    /// Pause between calls within a batch, in seconds
    pub call_delay_secs: u64,

    /// Pause between batches, in seconds
    pub batch_delay_secs: u64,
}

/// Storage path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the persisted persona layout
    pub output_dir: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Openai,
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_margin_secs: 1,
            default_rate_limit_wait_secs: 17,
            max_rate_limit_wait_secs: 300,
            backoff_floor_secs: 2,
            backoff_ceiling_secs: 60,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let mut chunk_delay_overrides = BTreeMap::new();
        chunk_delay_overrides.insert("csv2".to_string(), 20);
        Self {
            chunk_size: 15_000,
            batching_threshold_tokens: 40_000,
            max_estimated_tokens: 100_000,
            chunk_delay_secs: 5,
            chunk_delay_overrides,
        }
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            batch_size: 2,
            call_delay_secs: 3,
            batch_delay_secs: 20,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: "./outputs".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl GenerationSettings {
    /// Pause between chunks for the given namespace
    pub fn chunk_delay(&self, namespace: Namespace) -> Duration {
        let secs = self
            .chunk_delay_overrides
            .get(namespace.as_str())
            .copied()
            .unwrap_or(self.chunk_delay_secs);
        Duration::from_secs(secs)
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| {
                Error::config_parse(format!("{}: {}", path.display(), e.message()), Some(e))
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        let search_paths = [
            PathBuf::from("persona-pipeline.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("persona-pipeline").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".persona-pipeline").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Model settings
        if let Ok(val) = std::env::var("PERSONA_PROVIDER") {
            match val.to_lowercase().as_str() {
                "openai" => self.model.provider = ProviderKind::Openai,
                "mock" => self.model.provider = ProviderKind::Mock,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("PERSONA_BASE_URL") {
            self.model.base_url = val;
        }
        if let Ok(val) = std::env::var("PERSONA_MODEL") {
            self.model.model = val;
        }
        if let Ok(val) = std::env::var("PERSONA_API_KEY") {
            if !val.is_empty() {
                self.model.api_key = Some(val);
            }
        }
        if let Ok(val) = std::env::var("PERSONA_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.model.timeout_secs = n;
            }
        }

        // Retry settings
        if let Ok(val) = std::env::var("PERSONA_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.retry.max_attempts = n;
            }
        }

        // Generation settings
        if let Ok(val) = std::env::var("PERSONA_CHUNK_SIZE") {
            if let Ok(n) = val.parse() {
                self.generation.chunk_size = n;
            }
        }

        // Scoring settings
        if let Ok(val) = std::env::var("PERSONA_BATCH_SIZE") {
            if let Ok(n) = val.parse() {
                self.scoring.batch_size = n;
            }
        }

        // Storage settings
        if let Ok(val) = std::env::var("PERSONA_OUTPUT_DIR") {
            self.storage.output_dir = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("PERSONA_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PERSONA_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PERSONA_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.storage.output_dir = expand_path(&self.storage.output_dir);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.provider == ProviderKind::Openai {
            let url = Url::parse(&self.model.base_url).map_err(|e| {
                Error::config_field_invalid("model.base_url", format!("invalid URL: {}", e))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::config_field_invalid(
                    "model.base_url",
                    "must start with http:// or https://",
                ));
            }
        }
        if self.model.model.trim().is_empty() {
            return Err(Error::config_field_invalid("model.model", "cannot be empty"));
        }
        if self.model.timeout_secs == 0 {
            return Err(Error::config_field_invalid("model.timeout_secs", "must be at least 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config_field_invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.default_rate_limit_wait_secs > self.retry.max_rate_limit_wait_secs {
            return Err(Error::config_field_invalid(
                "retry.default_rate_limit_wait_secs",
                "cannot exceed retry.max_rate_limit_wait_secs",
            ));
        }
        if self.retry.backoff_floor_secs > self.retry.backoff_ceiling_secs {
            return Err(Error::config_field_invalid(
                "retry.backoff_floor_secs",
                "cannot exceed retry.backoff_ceiling_secs",
            ));
        }

        if self.generation.chunk_size == 0 {
            return Err(Error::config_field_invalid("generation.chunk_size", "must be at least 1"));
        }
        for key in self.generation.chunk_delay_overrides.keys() {
            if key.parse::<Namespace>().is_err() {
                return Err(Error::config_field_invalid(
                    "generation.chunk_delay_overrides",
                    format!("unknown namespace '{}'", key),
                ));
            }
        }

        if self.scoring.batch_size == 0 {
            return Err(Error::config_field_invalid("scoring.batch_size", "must be at least 1"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Root of the persisted persona layout
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.output_dir)
    }

    /// Credential passed to every model call
    pub fn credential(&self) -> ApiCredential {
        self.model
            .api_key
            .as_deref()
            .map(ApiCredential::new)
            .unwrap_or_else(ApiCredential::anonymous)
    }

    /// Copy that is safe to print
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.model.api_key.is_some() {
            config.model.api_key = Some("<redacted>".to_string());
        }
        config
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".persona-pipeline")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Persona Pipeline Configuration

[model]
# Transport: "openai" (any OpenAI-compatible endpoint) or "mock" (offline)
provider = "openai"

# API base URL; /chat/completions is appended
base_url = "https://generativelanguage.googleapis.com/v1beta/openai"

# Model identifier
model = "gemini-2.0-flash"

# API key (prefer the PERSONA_API_KEY environment variable)
# api_key = ""

# Absolute limit per model call in seconds
timeout_secs = 60

# Sampling temperature
temperature = 0.7

[retry]
# Attempts per model call, including the first
max_attempts = 5

# Seconds added to an API-suggested retry delay
rate_limit_margin_secs = 1

# Wait when a rate limit response carries no delay hint
default_rate_limit_wait_secs = 17

# Longest API-suggested delay honoured before retrying
max_rate_limit_wait_secs = 300

# Exponential backoff bounds for timeouts and 5xx responses
backoff_floor_secs = 2
backoff_ceiling_secs = 60

[generation]
# Characters per chunk for large documents
chunk_size = 15000

# Documents estimated above this many tokens are processed in chunks
batching_threshold_tokens = 40000

# Unchunked documents above this estimate are rejected
max_estimated_tokens = 100000

# Seconds between chunks
chunk_delay_secs = 5

[generation.chunk_delay_overrides]
csv2 = 20

[scoring]
# Personas per batch
batch_size = 2

# Seconds between calls inside a batch
call_delay_secs = 3

# Seconds between batches
batch_delay_secs = 20

[storage]
# Root of personas/, archives and conversation logs
output_dir = "./outputs"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.persona-pipeline/logs/pipeline.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
