use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{OrderId, PaymentId};

/// Payment methods offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Invoice,
}

impl PaymentMethod {
    pub fn all() -> &'static [PaymentMethod] {
        &[
            PaymentMethod::Card,
            PaymentMethod::BankTransfer,
            PaymentMethod::Invoice,
        ]
    }

    /// Only card payments through the hosted gateway are wired up.
    pub fn is_operative(self) -> bool {
        matches!(self, PaymentMethod::Card)
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::BankTransfer => "Bank transfer",
            PaymentMethod::Invoice => "Invoice",
        }
    }
}

/// Gateway-issued checkout session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Longest session id accepted from a return URL.
pub const MAX_SESSION_ID_LEN: usize = 255;

/// Session metadata key carrying the payment id the session was opened for.
pub const PAYMENT_REFERENCE_KEY: &str = "paymentId";

impl SessionId {
    /// Parse a session id arriving in a query string. Same alphabet as
    /// [`PaymentId::parse`].
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        ok.then(|| SessionId(raw.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic session status: `Created → Pending → {Paid | Unpaid | Expired}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Pending,
    Paid,
    Unpaid,
    Expired,
}

impl SessionStatus {
    pub fn can_advance_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Created, SessionStatus::Pending)
                | (SessionStatus::Created, SessionStatus::Expired)
                | (SessionStatus::Pending, SessionStatus::Paid)
                | (SessionStatus::Pending, SessionStatus::Unpaid)
                | (SessionStatus::Pending, SessionStatus::Expired)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session status cannot move from {from:?} to {to:?}")]
pub struct SessionRegression {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// A checkout session as tracked by the client that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: SessionId,
    pub client_reference: OrderId,
    pub status: SessionStatus,
    pub checkout_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl PaymentSession {
    /// Advance the status. Staying put is allowed, going back is not.
    pub fn advance(&mut self, next: SessionStatus) -> Result<(), SessionRegression> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_advance_to(next) {
            return Err(SessionRegression {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ─── Gateway wire types ─────────────────────────────────────────────────────

/// One product line on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    /// Unit price in minor currency units.
    pub unit_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub line_items: Vec<LineItem>,
    pub client_reference: OrderId,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back by the session-details lookup.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CreateSessionRequest {
    /// Tag the session with the payment it settles.
    pub fn with_payment_reference(mut self, payment_id: &PaymentId) -> Self {
        self.metadata
            .insert(PAYMENT_REFERENCE_KEY.to_string(), payment_id.0.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedSession {
    pub id: SessionId,
    pub url: String,
}

/// Status reported by the gateway's session-details lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewaySessionStatus {
    Paid,
    Unpaid,
    Expired,
}

impl From<GatewaySessionStatus> for SessionStatus {
    fn from(status: GatewaySessionStatus) -> Self {
        match status {
            GatewaySessionStatus::Paid => SessionStatus::Paid,
            GatewaySessionStatus::Unpaid => SessionStatus::Unpaid,
            GatewaySessionStatus::Expired => SessionStatus::Expired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub status: GatewaySessionStatus,
    /// Total in minor currency units.
    pub amount_total: u64,
    pub currency: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SessionDetails {
    pub fn payment_reference(&self) -> Option<&str> {
        self.metadata.get(PAYMENT_REFERENCE_KEY).map(String::as_str)
    }

    /// Paid, and opened for `payment_id`.
    pub fn settles(&self, payment_id: &PaymentId) -> bool {
        self.status == GatewaySessionStatus::Paid
            && self.payment_reference() == Some(payment_id.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PaymentSession {
        PaymentSession {
            id: SessionId("cs_1".into()),
            client_reference: OrderId("ord-1".into()),
            status: SessionStatus::Created,
            checkout_url: "https://pay.example/cs_1".into(),
            success_url: "https://shop.example/payment/success".into(),
            cancel_url: "https://shop.example/payment/cancel".into(),
        }
    }

    #[test]
    fn only_card_is_operative() {
        let operative: Vec<_> = PaymentMethod::all()
            .iter()
            .filter(|m| m.is_operative())
            .collect();
        assert_eq!(operative, vec![&PaymentMethod::Card]);
    }

    #[test]
    fn session_status_is_monotonic() {
        let mut s = session();
        s.advance(SessionStatus::Pending).unwrap();
        s.advance(SessionStatus::Pending).unwrap();
        s.advance(SessionStatus::Paid).unwrap();
        assert_eq!(
            s.advance(SessionStatus::Pending),
            Err(SessionRegression {
                from: SessionStatus::Paid,
                to: SessionStatus::Pending
            })
        );
        assert!(s.advance(SessionStatus::Expired).is_err());
        assert_eq!(s.status, SessionStatus::Paid);
    }

    #[test]
    fn created_session_may_expire_unvisited() {
        let mut s = session();
        s.advance(SessionStatus::Expired).unwrap();
        assert!(s.advance(SessionStatus::Pending).is_err());
    }

    #[test]
    fn session_details_wire_format() {
        let json = r#"{"status":"paid","amountTotal":3150,"currency":"eur","metadata":{"orderId":"ord-1"}}"#;
        let details: SessionDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.status, GatewaySessionStatus::Paid);
        assert_eq!(SessionStatus::from(details.status), SessionStatus::Paid);
        assert_eq!(details.metadata["orderId"], "ord-1");
        assert_eq!(details.payment_reference(), None);
    }

    #[test]
    fn session_settles_only_its_own_payment() {
        let json = r#"{"status":"paid","amountTotal":1,"currency":"eur","metadata":{"paymentId":"pay-1"}}"#;
        let mut details: SessionDetails = serde_json::from_str(json).unwrap();
        assert!(details.settles(&PaymentId("pay-1".into())));
        assert!(!details.settles(&PaymentId("pay-2".into())));

        details.status = GatewaySessionStatus::Unpaid;
        assert!(!details.settles(&PaymentId("pay-1".into())));

        details.status = GatewaySessionStatus::Paid;
        details.metadata.clear();
        assert!(!details.settles(&PaymentId("pay-1".into())));
    }

    #[test]
    fn session_id_rejects_path_tricks() {
        assert!(SessionId::parse("cs_test_a1B2").is_some());
        for bad in ["", "../../x", "..%2F..%2Fx", "cs 1", "cs/1", "cs?x=1"] {
            assert!(SessionId::parse(bad).is_none(), "{bad}");
        }
        assert!(SessionId::parse(&"a".repeat(MAX_SESSION_ID_LEN + 1)).is_none());
    }

    #[test]
    fn payment_reference_rides_in_metadata() {
        let request = CreateSessionRequest {
            line_items: Vec::new(),
            client_reference: OrderId("ord-1".into()),
            currency: "eur".into(),
            success_url: "https://shop.example/payment/success".into(),
            cancel_url: "https://shop.example/payment/cancel".into(),
            metadata: BTreeMap::new(),
        }
        .with_payment_reference(&PaymentId("pay-1".into()));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["metadata"]["paymentId"], "pay-1");
    }
}
