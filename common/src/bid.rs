use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{CompanyId, UserId};
use crate::listing::{Listing, ListingId, ListingStatus};
use crate::money::{Amount, AmountError};

/// Unique bid identifier (backend-issued).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BidId(pub String);

/// A monetary offer against a biddable listing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub listing_id: ListingId,
    pub bidder: UserId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Why a bid was refused before reaching the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidRejection {
    #[error("listing is {0:?}, bids are only taken on active listings")]
    ListingNotActive(ListingStatus),
    #[error("listing does not accept bids")]
    NotBiddable,
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),
    #[error("bid must be greater than {floor}")]
    TooLow { floor: Amount },
}

/// Decide whether `amount` is worth sending as a bid on `listing`.
///
/// Listing checks run first, so a closed or non-biddable listing rejects every
/// input. On success the parsed amount is returned; its `Display` is the
/// normalized two-decimal form sent to the backend.
pub fn validate(
    amount: &str,
    listing: &Listing,
    current_high_bid: Option<Amount>,
) -> Result<Amount, BidRejection> {
    if listing.status != ListingStatus::Active {
        return Err(BidRejection::ListingNotActive(listing.status));
    }
    if !listing.is_biddable {
        return Err(BidRejection::NotBiddable);
    }
    let amount = Amount::parse(amount)?;
    let floor = listing.bid_floor(current_high_bid);
    if amount <= floor {
        return Err(BidRejection::TooLow { floor });
    }
    Ok(amount)
}

/// Bid-creation request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidProposal {
    pub listing_id: ListingId,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
}

impl BidProposal {
    /// Build a proposal from a validated amount. A malformed company identity
    /// is dropped so the request stays valid; the bid then goes out in the
    /// bidder's own name.
    pub fn new(listing_id: ListingId, amount: Amount, company: Option<&str>) -> Self {
        let company_id = company.and_then(|raw| {
            let parsed = CompanyId::parse(raw);
            if parsed.is_none() {
                tracing::debug!(company = raw, "dropping malformed company identity from bid");
            }
            parsed
        });
        Self {
            listing_id,
            amount,
            company_id,
        }
    }
}
