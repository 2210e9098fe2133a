use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::UserId;
use crate::listing::ListingId;
use crate::money::Amount;
use crate::payment::PaymentMethod;

/// Unique order identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Backend-issued payment identifier. Embedded in the gateway return URLs and
/// used as the reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

/// Longest payment id accepted from a return URL.
pub const MAX_PAYMENT_ID_LEN: usize = 128;

impl PaymentId {
    /// Parse a payment id arriving in a query string. Only ASCII
    /// alphanumerics, `-` and `_` are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = !raw.is_empty()
            && raw.len() <= MAX_PAYMENT_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        ok.then(|| PaymentId(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderStatus {
    /// Returns true if transitioning from self to `next` is valid.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Pending, OrderStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub listing_id: ListingId,
    pub quantity: u32,
    pub unit_price: Amount,
}

impl OrderItem {
    pub fn line_total(&self) -> Option<Amount> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub payment_id: PaymentId,
    pub buyer: UserId,
    pub seller: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Amount,
    pub status: OrderStatus,
}

impl Order {
    /// Apply a status change. Re-applying the current status is a no-op and
    /// returns `Ok(false)`, so duplicate confirmations never count twice.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<bool, InvalidTransition> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(true)
    }
}

/// Order-creation request body. The backend recomputes the authoritative total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItem>,
    pub payment_method: PaymentMethod,
}
