use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::models::DEFAULT_MODEL;

pub const DEFAULT_CALLS_URL: &str = "https://api.openai.com/v1/realtime/calls";
pub const DEFAULT_SIDEBAND_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_CHANNEL_LABEL: &str = "oai-events";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where protocol events travel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMode {
    /// A data channel negotiated on the peer connection itself.
    DataChannel { label: String },
    /// A WebSocket to the same call, opened after the SDP answer.
    Sideband { url: Url },
}

impl Default for ControlMode {
    fn default() -> Self {
        Self::DataChannel {
            label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub broker_url: Option<Url>,
    pub calls_url: String,
    pub model: String,
    /// Deadline for the link to come up once the answer is applied.
    pub connect_timeout: Duration,
    pub control: ControlMode,
    pub transcription_model: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            calls_url: DEFAULT_CALLS_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            control: ControlMode::default(),
            transcription_model: None,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `RT_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable is present but invalid.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[allow(clippy::result_large_err)]
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("RT_BROKER_URL") {
            config.broker_url = Some(parse_url("RT_BROKER_URL", &raw)?);
        }
        if let Some(raw) = lookup("RT_CALLS_URL") {
            config.calls_url = parse_url("RT_CALLS_URL", &raw)?.into();
        }
        if let Some(model) = lookup("RT_MODEL") {
            config.model = model;
        }
        if let Some(raw) = lookup("RT_CONNECT_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("RT_CONNECT_TIMEOUT_MS must be milliseconds, got {raw:?}"))
            })?;
            if ms == 0 {
                return Err(Error::Config("RT_CONNECT_TIMEOUT_MS must be positive".to_string()));
            }
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("RT_SIDEBAND_URL") {
            config.control = ControlMode::Sideband {
                url: parse_url("RT_SIDEBAND_URL", &raw)?,
            };
        }
        config.transcription_model = lookup("RT_TRANSCRIPTION_MODEL").filter(|m| !m.is_empty());

        Ok(config)
    }

    #[must_use]
    pub fn broker_url(mut self, url: Url) -> Self {
        self.broker_url = Some(url);
        self
    }

    #[must_use]
    pub fn calls_url(mut self, url: impl Into<String>) -> Self {
        self.calls_url = url.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn control(mut self, control: ControlMode) -> Self {
        self.control = control;
        self
    }

    #[must_use]
    pub fn transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = Some(model.into());
        self
    }
}

#[allow(clippy::result_large_err)]
fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| Error::Config(format!("{key} is not a valid URL: {e}")))
}
