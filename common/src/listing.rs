use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::UserId;
use crate::money::Amount;

/// Unique listing identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

/// Unit a listing's stock is measured in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Kilogram,
    Tonne,
    Piece,
    CubicMetre,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Pending,
    Expired,
}

/// A sellable lot of recycled material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub seller: UserId,
    pub title: String,
    pub starting_price: Amount,
    pub stock_amount: u32,
    pub unit: UnitOfMeasure,
    pub is_biddable: bool,
    pub status: ListingStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// True if the listing currently takes bids.
    pub fn accepts_bids(&self) -> bool {
        self.status == ListingStatus::Active && self.is_biddable
    }

    /// The amount a new bid must strictly exceed.
    pub fn bid_floor(&self, current_high_bid: Option<Amount>) -> Amount {
        current_high_bid.unwrap_or(self.starting_price)
    }

    /// Move an `Active` listing past its expiry to `Expired`.
    /// Returns `true` if the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) if self.status == ListingStatus::Active && expires_at <= now => {
                self.status = ListingStatus::Expired;
                true
            }
            _ => false,
        }
    }
}

/// A listing together with the current highest bid, as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub listing: Listing,
    #[serde(default)]
    pub high_bid: Option<Amount>,
}
