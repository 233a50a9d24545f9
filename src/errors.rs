use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(#[from] InitializationError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;

/// Failures of a single request/response exchange with the decision oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("API key not set")]
    AuthenticationMissing,

    #[error("invalid API key: {0}")]
    Unauthorized(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("upstream error: {0}")]
    UpstreamError(String),
}

impl OracleError {
    /// Actionable message for the person running the command.
    pub fn guidance(&self) -> String {
        match self {
            OracleError::AuthenticationMissing => {
                "API key not set. Add it to config.toml or set TABPILOT_<PROVIDER>_API_KEY.".into()
            }
            OracleError::Unauthorized(_) => {
                "Invalid API key: the oracle rejected the configured credential. Please update your API key.".into()
            }
            OracleError::NetworkError(_) => {
                "Network error: could not connect to the oracle. Please check your internet connection and try again.".into()
            }
            OracleError::QuotaExceeded(_) => {
                "API quota exceeded: your usage limit has been reached. Please check your account.".into()
            }
            OracleError::Timeout(secs) => {
                format!("Request timeout: the oracle did not answer within {secs}s. Please try again later.")
            }
            OracleError::UpstreamError(msg) => format!("Oracle error: {msg}"),
        }
    }
}

/// Raised only when every decoder tier has been exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("oracle reply was empty")]
    Empty,

    #[error("no usable {expected} found in oracle reply: {reason}")]
    Exhausted { expected: &'static str, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no active target to capture")]
    NoTarget,

    #[error("snapshot capture failed: {0}")]
    Failed(String),
}

/// Validation failure of a decoded action against its kind's requirements.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("{kind} action is missing required field `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failure reported by the environment while performing one instruction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StepExecutionError {
    pub message: String,
}

impl StepExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitializationError {
    #[error("No active tab found")]
    NoActiveTarget,

    #[error("Failed to capture snapshot: {0}")]
    Capture(#[from] CaptureError),

    #[error("{}", .0.guidance())]
    Oracle(#[from] OracleError),

    #[error("Invalid response from AI: {0}")]
    Decode(#[from] DecodeError),
}
