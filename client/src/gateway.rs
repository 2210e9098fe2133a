use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use reclaim_common::payment::{CreateSessionRequest, CreatedSession, SessionDetails, SessionId};

/// Errors from payment gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
    #[error("gateway base url {0} cannot take a path")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Unavailable(e.to_string())
    }
}

/// Abstraction over hosted-checkout payment gateways.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Open a hosted checkout session. Returns its id and the page to send the user to.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, GatewayError>;

    /// Look up a session's authoritative status.
    async fn session_details(&self, id: &SessionId) -> Result<SessionDetails, GatewayError>;

    /// Human-readable name of this gateway backend.
    fn gateway_name(&self) -> &str;
}

/// Hosted-checkout gateway reached over HTTPS with a secret API key.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// `base_url` with `segments` appended, each percent-encoded as one
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| GatewayError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, GatewayError> {
        let resp = req.bearer_auth(&self.api_key).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}; body={body}")))
    }
}

impl PaymentGateway for HttpGateway {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, GatewayError> {
        let url = self.endpoint(&["checkout", "sessions"])?;
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn session_details(&self, id: &SessionId) -> Result<SessionDetails, GatewayError> {
        let url = self.endpoint(&["checkout", "sessions", &id.0])?;
        self.send_json(self.client.get(url)).await
    }

    fn gateway_name(&self) -> &str {
        "hosted-checkout"
    }
}
