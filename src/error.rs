use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    RateLimitError,
    AuthenticationError,
    ServerError,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Payload of an inbound `error` event.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerError {
    #[serde(rename = "type", default)]
    pub error_type: ApiErrorType,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Error parameter is a string field name in GA responses.
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Credential broker error: {0}")]
    Credential(String),

    #[error("Audio capture unavailable: {0}")]
    Capture(String),

    #[error("Transport negotiation failed: {0}")]
    Negotiation(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed control-channel message: {0}")]
    Protocol(String),

    #[error("Realtime endpoint error: {0}")]
    Remote(ServerError),

    #[error("Connection attempt was superseded")]
    Cancelled,

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP protocol error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,
}

/// Coarse classification used by hosts to decide what to show and whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Credential,
    Capture,
    Negotiation,
    Timeout,
    Protocol,
    Remote,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Whether this kind aborts an in-progress connect.
    #[must_use]
    pub const fn is_connect_fatal(self) -> bool {
        matches!(
            self,
            Self::Credential | Self::Capture | Self::Negotiation | Self::Timeout
        )
    }
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Credential(_) => ErrorKind::Credential,
            Self::Capture(_) => ErrorKind::Capture,
            Self::Negotiation(_) | Self::WebSocket(_) => ErrorKind::Negotiation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) | Self::Serialization(_) => ErrorKind::Protocol,
            Self::Remote(_) => ErrorKind::Remote,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnknownPersona(_)
            | Self::Config(_)
            | Self::Http(_)
            | Self::Url(_)
            | Self::Header(_)
            | Self::ConnectionClosed => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
