//! Marketplace REST backend.
//!
//! Only the operations the workflow needs; everything else the front end does
//! with the backend lives outside this crate.

use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use reclaim_common::bid::{Bid, BidProposal};
use reclaim_common::listing::{ListingId, ListingSnapshot};
use reclaim_common::notification::{Notification, NotificationId};
use reclaim_common::order::{CreateOrderRequest, Order, PaymentId};

/// Errors from backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),
    #[error("backend base url {0} cannot take a path")]
    InvalidUrl(String),
}

impl BackendError {
    /// True when the backend refused the request because the resource moved
    /// on (e.g. a higher bid landed first).
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Rejected { status, .. } if *status == StatusCode::CONFLICT.as_u16())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Unreachable(e.to_string())
    }
}

/// Abstraction over the marketplace backend (HTTP in production, in-memory in tests).
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// Current listing state plus the highest bid so far.
    async fn listing(&self, id: &ListingId) -> Result<ListingSnapshot, BackendError>;

    /// Submit a validated bid. One attempt, no retries.
    async fn create_bid(&self, proposal: &BidProposal) -> Result<Bid, BackendError>;

    /// Create a pending order; the response carries the payment id used in return URLs.
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BackendError>;

    async fn notifications(&self) -> Result<Vec<Notification>, BackendError>;

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), BackendError>;

    async fn mark_all_notifications_read(&self) -> Result<(), BackendError>;

    /// Report a first arrival at the success endpoint for `payment_id`.
    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<(), BackendError>;
}

/// Error body the backend sends with non-2xx responses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// reqwest-backed [`Backend`].
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `base_url` with `segments` appended, each percent-encoded as one
    /// path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let invalid = || BackendError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, BackendError> {
        let resp = self.authorize(req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send(req).await?;
        serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(format!("{e}; body={body}")))
    }
}

impl Backend for HttpBackend {
    async fn listing(&self, id: &ListingId) -> Result<ListingSnapshot, BackendError> {
        self.send_json(self.client.get(self.url(&["listings", &id.0])?))
            .await
    }

    async fn create_bid(&self, proposal: &BidProposal) -> Result<Bid, BackendError> {
        self.send_json(self.client.post(self.url(&["bids"])?).json(proposal))
            .await
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BackendError> {
        self.send_json(self.client.post(self.url(&["orders"])?).json(request))
            .await
    }

    async fn notifications(&self) -> Result<Vec<Notification>, BackendError> {
        self.send_json(self.client.get(self.url(&["notifications"])?))
            .await
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), BackendError> {
        self.send(self.client.post(self.url(&["notifications", &id.0, "read"])?))
        .await
        .map(drop)
    }

    async fn mark_all_notifications_read(&self) -> Result<(), BackendError> {
        self.send(self.client.post(self.url(&["notifications", "read-all"])?))
            .await
            .map(drop)
    }

    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<(), BackendError> {
        self.send(self.client.post(self.url(&["payments", &payment_id.0, "confirm"])?))
        .await
        .map(drop)
    }
}
