use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, LOCATION};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::models::{
    AudioConfig, OutputAudioConfig, Session, SessionConfig, Voice,
};

const BASE_URL: &str = "https://api.openai.com/v1/realtime";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Expiry as reported by a broker: epoch seconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiry {
    Epoch(u64),
    Timestamp(String),
}

/// Short-lived credential for exactly one negotiation.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub credential: String,
    #[serde(default)]
    pub expires_at: Option<Expiry>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("credential", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl SessionDescriptor {
    /// A credential that cannot travel in a header fails the negotiation.
    #[allow(clippy::result_large_err)]
    fn bearer(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&format!("Bearer {}", self.credential))
            .map_err(|e| Error::Negotiation(format!("credential is not a valid header: {e}")))
    }
}

/// Exchanges the host's long-lived secret for a [`SessionDescriptor`].
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// # Errors
    /// Returns `Error::Credential` if the broker rejects the request or is unreachable.
    async fn request(&self, instructions: &str, voice: Voice) -> Result<SessionDescriptor>;
}

/// Sends the local offer to the endpoint and returns its answer.
#[async_trait]
pub trait SdpExchange: Send + Sync {
    /// # Errors
    /// Returns `Error::Negotiation` if the endpoint refuses the offer.
    async fn exchange(&self, descriptor: &SessionDescriptor, offer: String) -> Result<SdpAnswer>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpAnswer {
    pub sdp: String,
    pub call_id: Option<String>,
}

#[derive(Serialize)]
struct BrokerRequest<'a> {
    instructions: &'a str,
    voice: Voice,
}

#[derive(Deserialize)]
struct BrokerRejection {
    error: String,
}

#[allow(clippy::result_large_err)]
fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(DEFAULT_POOL_IDLE_TIMEOUT)
        .build()?)
}

/// Broker reached over plain HTTP: the host's own backend keeps the secret.
#[derive(Clone, Debug)]
pub struct HttpCredentialBroker {
    client: Client,
    url: Url,
}

impl HttpCredentialBroker {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(url: Url) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self> {
        Ok(Self { client: http_client(timeout)?, url })
    }
}

#[async_trait]
impl CredentialBroker for HttpCredentialBroker {
    async fn request(&self, instructions: &str, voice: Voice) -> Result<SessionDescriptor> {
        let res = self
            .client
            .post(self.url.clone())
            .json(&BrokerRequest { instructions, voice })
            .send()
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<BrokerRejection>(&body)
                .map_or_else(|_| status_line(status), |r| r.error);
            return Err(Error::Credential(reason));
        }

        res.json()
            .await
            .map_err(|e| Error::Credential(format!("malformed broker response: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralSecretResponse {
    pub value: String,
    pub expires_at: u64,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize)]
struct CreateClientSecretRequest {
    session: SessionConfig,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// Mints client secrets directly from the realtime API.
///
/// Only for trusted hosts that hold the long-lived API key themselves.
#[derive(Clone, Debug)]
pub struct ClientSecretBroker {
    client: Client,
    auth_header: HeaderValue,
    model: String,
    base_url: String,
}

impl ClientSecretBroker {
    /// # Errors
    /// Returns an error if the API key results in an invalid header or client build fails.
    #[allow(clippy::result_large_err)]
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self> {
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;
        auth_header.set_sensitive(true);
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT)?,
            auth_header,
            model: model.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CredentialBroker for ClientSecretBroker {
    async fn request(&self, instructions: &str, voice: Voice) -> Result<SessionDescriptor> {
        let mut session = SessionConfig::realtime(self.model.clone());
        session.instructions = Some(instructions.to_string());
        session.audio = Some(AudioConfig {
            input: None,
            output: Some(OutputAudioConfig { voice: Some(voice) }),
        });

        let res = self
            .client
            .post(format!("{}/client_secrets", self.base_url))
            .header(AUTHORIZATION, &self.auth_header)
            .json(&CreateClientSecretRequest { session })
            .send()
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or_else(|_| status_line(status), |b| b.error.message);
            return Err(Error::Credential(reason));
        }

        let secret: EphemeralSecretResponse = res
            .json()
            .await
            .map_err(|e| Error::Credential(format!("malformed client secret: {e}")))?;
        Ok(SessionDescriptor {
            credential: secret.value,
            expires_at: Some(Expiry::Epoch(secret.expires_at)),
            session_id: secret.session.id,
        })
    }
}

/// Posts raw SDP to the calls endpoint using the ephemeral credential.
#[derive(Clone, Debug)]
pub struct HttpSdpExchange {
    client: Client,
    calls_url: Url,
    model: String,
}

impl HttpSdpExchange {
    /// # Errors
    /// Returns an error if `calls_url` is invalid or the HTTP client cannot be built.
    #[allow(clippy::result_large_err)]
    pub fn new(calls_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT)?,
            calls_url: Url::parse(calls_url)?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl SdpExchange for HttpSdpExchange {
    async fn exchange(&self, descriptor: &SessionDescriptor, offer: String) -> Result<SdpAnswer> {
        let mut url = self.calls_url.clone();
        url.query_pairs_mut().append_pair("model", &self.model);

        let res = self
            .client
            .post(url)
            .header(AUTHORIZATION, descriptor.bearer()?)
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer)
            .send()
            .await
            .map_err(|e| Error::Negotiation(e.to_string()))?;

        if !res.status().is_success() {
            return Err(rejected_offer(res).await);
        }

        let call_id = res.headers().get(LOCATION).and_then(extract_call_id);
        let sdp = res.text().await.map_err(|e| Error::Negotiation(e.to_string()))?;
        if sdp.trim().is_empty() {
            return Err(Error::Negotiation("empty SDP answer".to_string()));
        }
        Ok(SdpAnswer { sdp, call_id })
    }
}

async fn rejected_offer(res: Response) -> Error {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    if body.is_empty() {
        Error::Negotiation(status_line(status))
    } else {
        Error::Negotiation(format!("{}: {body}", status_line(status)))
    }
}

fn status_line(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

fn extract_call_id(location: &HeaderValue) -> Option<String> {
    let value = location.to_str().ok()?;
    value.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
}
