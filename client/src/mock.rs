//! In-memory backend and gateway for development and tests.
//!
//! Orders settle only when `confirm_payment` is called; sessions stay
//! `unpaid` until a test moves them with [`MockGateway::set_status`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use reclaim_common::bid::{Bid, BidId, BidProposal};
use reclaim_common::identity::UserId;
use reclaim_common::listing::{Listing, ListingId, ListingSnapshot, ListingStatus, UnitOfMeasure};
use reclaim_common::money::Amount;
use reclaim_common::notification::{Notification, NotificationId};
use reclaim_common::order::{CreateOrderRequest, Order, OrderId, OrderStatus, PaymentId};
use reclaim_common::payment::{
    CreateSessionRequest, CreatedSession, GatewaySessionStatus, SessionDetails, SessionId,
};

use crate::backend::{Backend, BackendError};
use crate::gateway::{GatewayError, PaymentGateway};

/// The user every mock request is made as.
pub const MOCK_BUYER: &str = "buyer-1";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A listing with a 10.00 starting price and 5 units of stock.
pub fn sample_listing(id: &str, status: ListingStatus, is_biddable: bool) -> Listing {
    Listing {
        id: ListingId(id.to_string()),
        seller: UserId("seller-1".into()),
        title: "Shredded HDPE regrind".into(),
        starting_price: Amount::from_minor(1000),
        stock_amount: 5,
        unit: UnitOfMeasure::Tonne,
        is_biddable,
        status,
        expires_at: None,
    }
}

#[derive(Default)]
struct BackendState {
    listings: HashMap<ListingId, ListingSnapshot>,
    bids: Vec<Bid>,
    proposals: Vec<BidProposal>,
    orders: Vec<Order>,
    notifications: Vec<Notification>,
    confirmations: Vec<PaymentId>,
    paid_transitions: usize,
    listing_fetches: usize,
    fail_next_bid: Option<BackendError>,
    fail_next_order: Option<BackendError>,
}

/// In-memory [`Backend`].
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<BackendState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_listing(&self, listing: Listing, high_bid: Option<Amount>) {
        lock(&self.state)
            .listings
            .insert(listing.id.clone(), ListingSnapshot { listing, high_bid });
    }

    pub fn insert_notification(&self, notification: Notification) {
        lock(&self.state).notifications.push(notification);
    }

    /// Simulate another bidder getting in first.
    pub fn outbid(&self, listing_id: &ListingId, amount: Amount) {
        if let Some(snapshot) = lock(&self.state).listings.get_mut(listing_id) {
            snapshot.high_bid = Some(amount);
        }
    }

    pub fn fail_next_bid(&self, error: BackendError) {
        lock(&self.state).fail_next_bid = Some(error);
    }

    pub fn fail_next_order(&self, error: BackendError) {
        lock(&self.state).fail_next_order = Some(error);
    }

    pub fn bids(&self) -> Vec<Bid> {
        lock(&self.state).bids.clone()
    }

    pub fn proposals(&self) -> Vec<BidProposal> {
        lock(&self.state).proposals.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        lock(&self.state).orders.clone()
    }

    pub fn notifications_snapshot(&self) -> Vec<Notification> {
        lock(&self.state).notifications.clone()
    }

    pub fn confirmations(&self) -> Vec<PaymentId> {
        lock(&self.state).confirmations.clone()
    }

    /// How many orders actually moved to `paid`.
    pub fn paid_transitions(&self) -> usize {
        lock(&self.state).paid_transitions
    }

    pub fn listing_fetches(&self) -> usize {
        lock(&self.state).listing_fetches
    }
}

impl Backend for MockBackend {
    async fn listing(&self, id: &ListingId) -> Result<ListingSnapshot, BackendError> {
        let mut state = lock(&self.state);
        state.listing_fetches += 1;
        state
            .listings
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: format!("listing {} not found", id.0),
            })
    }

    async fn create_bid(&self, proposal: &BidProposal) -> Result<Bid, BackendError> {
        let mut state = lock(&self.state);
        state.proposals.push(proposal.clone());
        if let Some(e) = state.fail_next_bid.take() {
            return Err(e);
        }
        let snapshot = state
            .listings
            .get_mut(&proposal.listing_id)
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: "listing not found".into(),
            })?;
        if !snapshot.listing.accepts_bids() {
            return Err(BackendError::Rejected {
                status: 409,
                message: "listing closed".into(),
            });
        }
        if proposal.amount <= snapshot.listing.bid_floor(snapshot.high_bid) {
            return Err(BackendError::Rejected {
                status: 409,
                message: "a higher bid was placed".into(),
            });
        }
        snapshot.high_bid = Some(proposal.amount);
        let bid = Bid {
            id: BidId(format!("bid-{}", state.bids.len() + 1)),
            listing_id: proposal.listing_id.clone(),
            bidder: UserId(MOCK_BUYER.into()),
            amount: proposal.amount,
            created_at: Utc::now(),
        };
        state.bids.push(bid.clone());
        Ok(bid)
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BackendError> {
        let mut state = lock(&self.state);
        if let Some(e) = state.fail_next_order.take() {
            return Err(e);
        }
        let n = state.orders.len() + 1;
        let mut total = Amount::ZERO;
        for item in &request.items {
            total = item
                .line_total()
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| BackendError::Rejected {
                    status: 422,
                    message: "total overflow".into(),
                })?;
        }
        let seller = request
            .items
            .first()
            .and_then(|item| state.listings.get(&item.listing_id))
            .map(|s| s.listing.seller.clone())
            .unwrap_or_else(|| UserId("seller-1".into()));
        let order = Order {
            id: OrderId(format!("ord-{n}")),
            payment_id: PaymentId(format!("pay-{n}")),
            buyer: UserId(MOCK_BUYER.into()),
            seller,
            items: request.items.clone(),
            total_amount: total,
            status: OrderStatus::Pending,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn notifications(&self) -> Result<Vec<Notification>, BackendError> {
        Ok(lock(&self.state).notifications.clone())
    }

    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        match state.notifications.iter_mut().find(|n| &n.id == id) {
            Some(n) => {
                n.read = true;
                Ok(())
            }
            None => Err(BackendError::Rejected {
                status: 404,
                message: format!("notification {} not found", id.0),
            }),
        }
    }

    async fn mark_all_notifications_read(&self) -> Result<(), BackendError> {
        for n in lock(&self.state).notifications.iter_mut() {
            n.read = true;
        }
        Ok(())
    }

    async fn confirm_payment(&self, payment_id: &PaymentId) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.confirmations.push(payment_id.clone());
        let order = state
            .orders
            .iter_mut()
            .find(|o| &o.payment_id == payment_id)
            .ok_or_else(|| BackendError::Rejected {
                status: 404,
                message: format!("payment {} not found", payment_id.0),
            })?;
        let changed = order
            .transition_to(OrderStatus::Paid)
            .map_err(|e| BackendError::Rejected {
                status: 409,
                message: e.to_string(),
            })?;
        if changed {
            state.paid_transitions += 1;
        }
        Ok(())
    }
}

#[derive(Default)]
struct GatewayState {
    requests: Vec<CreateSessionRequest>,
    ids: Vec<SessionId>,
    statuses: HashMap<SessionId, GatewaySessionStatus>,
    fail_next: Option<GatewayError>,
}

/// Mock hosted-checkout gateway. Every session starts `unpaid`.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_session(&self, error: GatewayError) {
        lock(&self.state).fail_next = Some(error);
    }

    pub fn set_status(&self, id: &SessionId, status: GatewaySessionStatus) {
        lock(&self.state).statuses.insert(id.clone(), status);
    }

    pub fn created_sessions(&self) -> Vec<CreateSessionRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn created_session_ids(&self) -> Vec<SessionId> {
        lock(&self.state).ids.clone()
    }
}

impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, GatewayError> {
        let mut state = lock(&self.state);
        if let Some(e) = state.fail_next.take() {
            return Err(e);
        }
        let id = SessionId(format!("cs_mock_{}", state.ids.len() + 1));
        state.requests.push(request.clone());
        state.ids.push(id.clone());
        state
            .statuses
            .insert(id.clone(), GatewaySessionStatus::Unpaid);
        Ok(CreatedSession {
            url: format!("https://pay.mock/{}", id.0),
            id,
        })
    }

    async fn session_details(&self, id: &SessionId) -> Result<SessionDetails, GatewayError> {
        let state = lock(&self.state);
        let index = state
            .ids
            .iter()
            .position(|known| known == id)
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                body: format!("no such session {}", id.0),
            })?;
        let request = &state.requests[index];
        let amount_total = request
            .line_items
            .iter()
            .map(|item| item.unit_amount * u64::from(item.quantity))
            .sum();
        Ok(SessionDetails {
            status: state
                .statuses
                .get(id)
                .copied()
                .unwrap_or(GatewaySessionStatus::Unpaid),
            amount_total,
            currency: request.currency.clone(),
            metadata: request
                .metadata
                .clone()
                .into_iter()
                .chain([("clientReference".to_string(), request.client_reference.0.clone())])
                .collect(),
        })
    }

    fn gateway_name(&self) -> &str {
        "mock"
    }
}
