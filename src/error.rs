//! Error types for ch-http.
//!
//! Defines the main error enum used throughout the driver.

use thiserror::Error;

/// Main error type for driver operations.
#[derive(Error, Debug)]
pub enum ChError {
    /// Configuration errors (missing connection, bad connection string,
    /// protocol mismatches detected during the handshake, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server reported a version string that could not be parsed.
    #[error("Invalid server version '{0}'")]
    InvalidVersion(String),

    /// A parameter was declared with a type tag the driver cannot format.
    #[error("Unsupported parameter type: {0}")]
    UnsupportedParameterType(String),

    /// A parameter value does not fit the domain of its declared type.
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameterValue { name: String, reason: String },

    /// A `{name}` placeholder without the `:type` part.
    #[error("Placeholder '{{{0}}}' is missing a type annotation")]
    MissingTypeAnnotation(String),

    /// A placeholder refers to a parameter that was never bound.
    #[error("Parameter '{0}' not found")]
    ParameterNotFound(String),

    /// A `{` with no closing `}`.
    #[error("Unterminated placeholder starting at byte {0}")]
    UnterminatedPlaceholder(usize),

    /// API misuse, such as reading negotiated features from a closed connection.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The caller's cancellation token fired before the operation completed.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Failures raised by the HTTP transport (timeouts, refused connections, etc.)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server error (HTTP {status}): {message}\nQuery: {sql}")]
    Server {
        status: u16,
        code: Option<u32>,
        message: String,
        sql: String,
    },
}

impl ChError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid-operation error with the given message.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Creates an invalid parameter value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameterValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the transport gave up because a timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns the ClickHouse exception code for server errors, if known.
    pub fn server_code(&self) -> Option<u32> {
        match self {
            Self::Server { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_)
            | Self::InvalidVersion(_)
            | Self::UnsupportedParameterType(_)
            | Self::InvalidParameterValue { .. }
            | Self::MissingTypeAnnotation(_)
            | Self::ParameterNotFound(_)
            | Self::UnterminatedPlaceholder(_) => "Configuration Error",
            Self::InvalidOperation(_) => "Invalid Operation",
            Self::Cancelled | Self::Transport(_) => "Transport Error",
            Self::Server { .. } => "Server Error",
        }
    }
}

/// Result type alias using ChError.
pub type Result<T> = std::result::Result<T, ChError>;
