//! Error taxonomy for the relay
//!
//! Configuration errors stop startup; fetch errors end the relay loop.
//! Both propagate to `main`.
//! Forward errors are logged where they happen and never propagate.

use super::error_handler::MaxRetriesExceeded;

#[derive(Debug)]
pub enum ConfigError {
    MissingField(String),
    InvalidValue(String),
    Io(String),
    Parse(String),
    /// Several problems found in one pass
    Multiple(Vec<ConfigError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingField(field) => write!(f, "Missing configuration field: {}", field),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigError::Io(msg) => write!(f, "Failed to read configuration: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::Multiple(errors) => {
                let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "{}", joined.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug)]
pub enum FetchError {
    /// Network failure or timeout talking to the source
    Transport(String),
    /// Source answered with a non-success status
    Status { code: u16, body: String },
    /// Response could not be decoded
    Decode(String),
    /// Query could not be built from the registered metrics
    Request(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "Metric fetch transport error: {}", msg),
            FetchError::Status { code, body } => {
                write!(f, "Metric fetch failed with status {}: {}", code, body)
            }
            FetchError::Decode(msg) => write!(f, "Metric fetch response malformed: {}", msg),
            FetchError::Request(msg) => write!(f, "Metric query invalid: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug)]
pub enum ForwardError {
    Transport(String),
    Rejected(String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Transport(msg) => write!(f, "Forward transport error: {}", msg),
            ForwardError::Rejected(msg) => write!(f, "Forward rejected by sink: {}", msg),
        }
    }
}

impl std::error::Error for ForwardError {}

/// Fatal errors that end a running relay loop
#[derive(Debug)]
pub enum RelayError {
    Fetch(FetchError),
    /// Retry policy gave up; carries the last fetch error
    RetriesExhausted(FetchError),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::Fetch(e) => write!(f, "{}", e),
            RelayError::RetriesExhausted(e) => write!(f, "{} ({})", MaxRetriesExceeded, e),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Fetch(e) | RelayError::RetriesExhausted(e) => Some(e),
        }
    }
}

impl From<FetchError> for RelayError {
    fn from(e: FetchError) -> Self {
        RelayError::Fetch(e)
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
