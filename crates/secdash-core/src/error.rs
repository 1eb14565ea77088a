use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single HTTP exchange, before any retry decision.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Network(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempts: {cause}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        cause: TransportError,
    },
    #[error("authentication failed: {0}")]
    Auth(#[source] TransportError),
    #[error("unexpected payload from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Exhausted { cause, .. } => cause.is_unauthorized(),
            Self::Auth(cause) => cause.is_unauthorized(),
            Self::Decode { .. } => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("identity {id} has label {label:?} without a \"(email)\" part")]
    MissingEmail { id: i64, label: String },
    #[error("unrecognized login time {0:?}")]
    LoginTime(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is not valid json: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid base url {0:?}")]
    BaseUrl(String),
}
