//! Error types for eddn-relay
//!
//! Per-message errors are caught at the ingestion loop boundary, tagged with
//! an [`Outcome`], logged, and never halt the loop. Construction-time errors
//! (schema preload, initial bus connection, feed dial) are fatal.

use std::fmt;
use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Input is not a valid zlib stream
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// Stream ended mid-record
    #[error("truncated compressed stream: {0}")]
    TruncatedStream(String),

    /// Malformed JSON or missing routing field
    #[error("could not decode event: {0}")]
    Decode(String),

    /// Schema could not be fetched or parsed
    #[error("could not load schema '{url}': {reason}")]
    SchemaLoad { url: String, reason: String },

    /// Schema document is structurally invalid
    #[error("could not compile schema '{url}': {reason}")]
    SchemaCompile { url: String, reason: String },

    /// Instance bytes are not valid JSON
    #[error("could not unmarshal instance: {0}")]
    InstanceParse(String),

    /// Instance is well-formed JSON but violates its schema
    #[error("validation failed for '{schema}': {reason}")]
    SchemaValidation { schema: String, reason: String },

    /// Bus transport failure
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },

    /// Feed transport failure (fail-fast upstream policy)
    #[error("feed transport error: {0}")]
    Feed(String),

    /// Bus connection failure
    #[error("bus connection error: {0}")]
    BusConnection(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal runtime error (task join, channel wiring)
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Create a schema load error
    pub fn schema_load(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SchemaLoad {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a schema compile error
    pub fn schema_compile(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SchemaCompile {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a publish error
    pub fn publish(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::Publish {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error came from schema acquisition rather than from the
    /// instance itself (load, compile, or resolution of a `$ref` dependency)
    pub fn is_schema_resolution(&self) -> bool {
        matches!(self, Self::SchemaLoad { .. } | Self::SchemaCompile { .. })
    }
}

/// Per-message processing outcome, attached to every processed frame for
/// telemetry. Never persisted, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Validated and republished
    Published,
    /// Decompression failed
    DeflateError,
    /// JSON decode failed or routing field missing
    DecodeError,
    /// Schema resolution or validation failed
    ValidationError,
    /// Bus publish failed
    PublishError,
}

impl Outcome {
    /// All outcomes, in render order
    pub const ALL: [Outcome; 5] = [
        Outcome::Published,
        Outcome::DeflateError,
        Outcome::DecodeError,
        Outcome::ValidationError,
        Outcome::PublishError,
    ];

    /// Metric label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::DeflateError => "deflate_error",
            Self::DecodeError => "decode_error",
            Self::ValidationError => "validation_error",
            Self::PublishError => "publish_error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
