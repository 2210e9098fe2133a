//! Gateway return-endpoint handling.
//!
//! The success and cancel endpoints receive `payment_id` and `returnUrl` as
//! query parameters. Everything needed to resume after the gateway lives in
//! those two parameters, never in memory.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkout::CheckoutOutcome;
use crate::order::PaymentId;

pub const PAYMENT_ID_PARAM: &str = "payment_id";
pub const RETURN_URL_PARAM: &str = "returnUrl";
pub const SESSION_ID_PARAM: &str = "session_id";
pub const SUCCESS_MARKER_KEY: &str = "purchaseSuccess";
pub const SUCCESS_MARKER_VALUE: &str = "1";

/// Where users land when the return target is unusable.
pub const APP_ROOT: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Success,
    Cancel,
}

impl ReturnKind {
    pub fn outcome(self) -> CheckoutOutcome {
        match self {
            ReturnKind::Success => CheckoutOutcome::Success,
            ReturnKind::Cancel => CheckoutOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("return request carries no payment id")]
    MissingPaymentId,
    #[error("return request carries a malformed payment id")]
    MalformedPaymentId,
    #[error("return request repeats the {0} parameter")]
    DuplicateParameter(&'static str),
}

/// Query parameters of a return endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnParams {
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(rename = "returnUrl", default)]
    pub return_url: Option<String>,
    /// Appended by gateways that echo the session id; only used when
    /// session verification is switched on.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ReturnParams {
    /// Collect the known parameters from raw query pairs. Unknown keys are
    /// ignored; a known key given twice is an error.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ReconcileError> {
        let mut params = ReturnParams::default();
        for (key, value) in pairs {
            let (slot, name) = match key.as_str() {
                PAYMENT_ID_PARAM => (&mut params.payment_id, PAYMENT_ID_PARAM),
                RETURN_URL_PARAM => (&mut params.return_url, RETURN_URL_PARAM),
                SESSION_ID_PARAM => (&mut params.session_id, SESSION_ID_PARAM),
                _ => continue,
            };
            if slot.replace(value).is_some() {
                return Err(ReconcileError::DuplicateParameter(name));
            }
        }
        Ok(params)
    }

    pub fn payment_id(&self) -> Result<PaymentId, ReconcileError> {
        let raw = self
            .payment_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ReconcileError::MissingPaymentId)?;
        PaymentId::parse(raw).ok_or(ReconcileError::MalformedPaymentId)
    }

    /// The in-app path to send the user to. Anything that is not a local
    /// path collapses to the application root.
    pub fn return_target(&self) -> &str {
        match self.return_url.as_deref().map(str::trim) {
            Some(url) if is_local_path(url) => url,
            _ => APP_ROOT,
        }
    }
}

/// Where a return endpoint should redirect, keyed by the payment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnRedirect {
    pub payment_id: PaymentId,
    pub location: String,
}

/// Resolve a return-endpoint hit into its redirect. Success appends the
/// purchase marker; cancel goes back to the return URL untouched.
pub fn resolve(kind: ReturnKind, params: &ReturnParams) -> Result<ReturnRedirect, ReconcileError> {
    let payment_id = params.payment_id()?;
    let target = params.return_target();
    let location = match kind {
        ReturnKind::Success => append_query_param(target, SUCCESS_MARKER_KEY, SUCCESS_MARKER_VALUE),
        ReturnKind::Cancel => target.to_string(),
    };
    Ok(ReturnRedirect {
        payment_id,
        location,
    })
}

/// True for same-origin absolute paths (`/orders/42`), false for absolute
/// URLs and protocol-relative forms (`//evil`, `/\evil`).
pub fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.starts_with("/\\")
        && !url.chars().any(char::is_control)
}

/// Append `key=value` to `url`, joining with `&` when a query string is
/// already present and `?` otherwise. A `#fragment` stays at the end.
pub fn append_query_param(url: &str, key: &str, value: &str) -> String {
    let (base, fragment) = match url.find('#') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    let separator = match base.find('?') {
        Some(i) if i + 1 == base.len() => "",
        Some(_) if base.ends_with('&') => "",
        Some(_) => "&",
        None => "?",
    };
    format!("{base}{separator}{key}={value}{fragment}")
}

/// True if the page location carries `purchaseSuccess=1`.
pub fn has_success_marker(location: &str) -> bool {
    let without_fragment = location.split('#').next().unwrap_or_default();
    let Some((_, query)) = without_fragment.split_once('?') else {
        return false;
    };
    query.split('&').any(|pair| {
        pair.split_once('=')
            .map(|(k, v)| k == SUCCESS_MARKER_KEY && v == SUCCESS_MARKER_VALUE)
            .unwrap_or(false)
    })
}
