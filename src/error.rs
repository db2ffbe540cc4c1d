//! Error types for the persona pipeline
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::CallError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    SerializationFailed = 204,
    ArchiveFailed = 205,

    // Model call errors (3xx)
    RateLimited = 300,
    TransientCallFailure = 301,
    FatalCallFailure = 302,
    RetriesExhausted = 303,

    // Pipeline errors (4xx)
    MalformedResponse = 400,
    InputTooLarge = 401,
    EmptyInput = 402,
    AllChunksFailed = 403,
    PersonaNotFound = 404,
    ProgressChannelClosed = 405,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Model call errors
            400..=499 => 40, // Pipeline errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Persona archive could not be written
    #[error("Failed to write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    // ─────────────────────────────────────────────────────────────
    // Model Call Errors
    // ─────────────────────────────────────────────────────────────

    /// The API asked us to slow down
    #[error("Rate limited by model API{}", fmt_retry_after(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, network failure or 5xx-like response
    #[error("Transient model call failure: {message}")]
    TransientCallFailure { message: String },

    /// Invalid credential or permanently rejected request
    #[error("Model call rejected: {message}")]
    FatalCallFailure { message: String },

    /// Retryable failures persisted past the attempt budget; `last` is the
    /// final attempt's failure
    #[error("Model call failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    // ─────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────

    /// No recoverable JSON in a model response
    #[error("Malformed model response: {message}")]
    MalformedResponse { message: String },

    /// Document too large to process in a single request
    #[error("Input too large: ~{estimated_tokens} estimated tokens exceeds the {limit} token ceiling")]
    InputTooLarge { estimated_tokens: usize, limit: usize },

    /// Nothing to send to the model
    #[error("Input is empty: {0}")]
    EmptyInput(String),

    /// Every chunk of a document failed
    #[error("All {chunks} chunks failed; no personas were generated")]
    AllChunksFailed { chunks: usize },

    /// Requested persona is not in the store
    #[error("Persona not found: {persona_id}")]
    PersonaNotFound { persona_id: String },

    /// Progress stream ended without a terminal event
    #[error("Progress channel closed before the batch reported a result")]
    ProgressChannelClosed,

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        match err {
            CallError::RateLimited { retry_after } => Error::RateLimited { retry_after },
            CallError::Transient(message) => Error::TransientCallFailure { message },
            CallError::Fatal(message) => Error::FatalCallFailure { message },
        }
    }
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Json(_) => ErrorCode::SerializationFailed,
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Archive { .. } => ErrorCode::ArchiveFailed,

            Error::RateLimited { .. } => ErrorCode::RateLimited,
            Error::TransientCallFailure { .. } => ErrorCode::TransientCallFailure,
            Error::FatalCallFailure { .. } => ErrorCode::FatalCallFailure,
            Error::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,

            Error::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            Error::InputTooLarge { .. } => ErrorCode::InputTooLarge,
            Error::EmptyInput(_) => ErrorCode::EmptyInput,
            Error::AllChunksFailed { .. } => ErrorCode::AllChunksFailed,
            Error::PersonaNotFound { .. } => ErrorCode::PersonaNotFound,
            Error::ProgressChannelClosed => ErrorCode::ProgressChannelClosed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'persona-pipeline config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'persona-pipeline config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::FatalCallFailure { .. } => Some(
                "Verify the API key (PERSONA_API_KEY) and the model name in the [model] section."
            ),
            Error::RetriesExhausted { last, .. } => last.suggestion(),
            Error::RateLimited { .. } => Some(
                "The model API is rate limiting this key. Wait a minute and try again, or raise the [retry] delays."
            ),
            Error::TransientCallFailure { .. } => Some(
                "The model API is unreachable or overloaded. Check 'model.base_url' and try again later."
            ),

            Error::InputTooLarge { .. } => Some(
                "Split the input into smaller files or lower 'generation.batching_threshold_tokens' so the document is processed in chunks."
            ),
            Error::AllChunksFailed { .. } => Some(
                "Run with -v to see why each chunk failed. Rate limits are the usual cause."
            ),
            Error::PersonaNotFound { .. } => Some(
                "Run 'persona-pipeline personas list' to see the available persona IDs."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>, source: Option<toml::de::Error>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Error::ConfigValidation {
            message: format!("{}: {}", field, message.into()),
            field: Some(field),
        }
    }

    /// Create a malformed response error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedResponse {
            message: message.into(),
        }
    }
}
