//! Error types for the auto-responder.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Rule store error: {0}")]
    Store(#[from] StoreError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors talking to the message source, the message sink, or the bridge behind them.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to fetch messages: {reason}")]
    FetchFailed { reason: String },

    #[error("Failed to send message to {chat_id}: {reason}")]
    SendFailed { chat_id: String, reason: String },

    #[error("Send to {chat_id} timed out after {timeout:?}")]
    Timeout { chat_id: String, timeout: Duration },

    #[error("Invalid response from bridge: {0}")]
    InvalidResponse(String),

    #[error("Bridge unhealthy after {attempts} attempts")]
    Unhealthy { attempts: u32 },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Rule store persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed rule file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Rule construction and evaluation errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid regex in rule '{rule}': {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to render response for rule '{rule}': {reason}")]
    Template { rule: String, reason: String },

    #[error("No rule at index {index} (rule set has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to open log file {path}: {source}")]
    OpenFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Result type alias for the auto-responder.
pub type Result<T> = std::result::Result<T, Error>;
