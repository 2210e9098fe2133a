//! Client configuration.
//!
//! Loaded from a JSON file shipped with the front end, e.g.
//!
//! ```json
//! {
//!   "apiBaseUrl": "https://api.reclaim.example/v1",
//!   "gateway": { "baseUrl": "https://pay.example", "apiKey": "sk_test_123" },
//!   "successEndpoint": "https://reclaim.example/payment/success",
//!   "cancelEndpoint": "https://reclaim.example/payment/cancel",
//!   "currency": "eur"
//! }
//! ```

use std::path::Path;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use reclaim_common::order::PaymentId;
use reclaim_common::return_url::{PAYMENT_ID_PARAM, RETURN_URL_PARAM};

/// Default settlement currency (ISO 4217, lower case as gateways expect).
pub const DEFAULT_CURRENCY: &str = "eur";

/// Icon shown on chat notifications when the push carries none.
pub const DEFAULT_NOTIFICATION_ICON: &str = "/icons/notification-192.png";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} is not a valid absolute URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    pub gateway: GatewayConfig,
    pub success_endpoint: String,
    pub cancel_endpoint: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_icon")]
    pub notification_icon: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_icon() -> String {
    DEFAULT_NOTIFICATION_ICON.to_string()
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.return_endpoints()?;
        parse_url("apiBaseUrl", &config.api_base_url)?;
        parse_url("gateway.baseUrl", &config.gateway.base_url)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn return_endpoints(&self) -> Result<ReturnEndpoints, ConfigError> {
        Ok(ReturnEndpoints {
            success: parse_url("successEndpoint", &self.success_endpoint)?,
            cancel: parse_url("cancelEndpoint", &self.cancel_endpoint)?,
        })
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })
}

/// The two pre-registered gateway return endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnEndpoints {
    success: Url,
    cancel: Url,
}

impl ReturnEndpoints {
    pub fn new(success: &str, cancel: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            success: parse_url("successEndpoint", success)?,
            cancel: parse_url("cancelEndpoint", cancel)?,
        })
    }

    /// Success and cancel URLs for one payment, each carrying the payment id
    /// and the in-app page to come back to.
    pub fn for_payment(&self, payment_id: &PaymentId, return_url: &str) -> (String, String) {
        let build = |base: &Url| {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair(PAYMENT_ID_PARAM, &payment_id.0)
                .append_pair(RETURN_URL_PARAM, return_url);
            url.to_string()
        };
        (build(&self.success), build(&self.cancel))
    }
}
