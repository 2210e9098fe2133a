//! Workflow orchestrator.
//!
//! Sequences bids, checkout and notifications in response to user actions and
//! keeps the state the presentation layer renders from. Every failed
//! operation also leaves a user-facing message in [`WorkflowState::last_error`].

use std::collections::HashMap;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use reclaim_common::bid::{self, Bid, BidProposal, BidRejection};
use reclaim_common::checkout::{Checkout, CheckoutError, CheckoutOutcome};
use reclaim_common::listing::{ListingId, ListingSnapshot};
use reclaim_common::money::Amount;
use reclaim_common::notification::{Inbox, NotificationId};
use reclaim_common::payment::PaymentMethod;
use reclaim_common::push::ChatId;
use reclaim_common::return_url::has_success_marker;

use crate::backend::{Backend, BackendError, HttpBackend};
use crate::config::{ClientConfig, ConfigError, ReturnEndpoints};
use crate::coordinator::{CoordinatorError, PaymentCoordinator};
use crate::delivery::{DeliveryClosed, DeliveryHandle};
use crate::gateway::{HttpGateway, PaymentGateway};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("bid rejected: {0}")]
    Bid(#[from] BidRejection),
    #[error("bid not accepted by the marketplace: {0}")]
    BidNotAccepted(#[source] BackendError),
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error(transparent)]
    Payment(#[from] CoordinatorError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("listing {0} has not been loaded")]
    UnknownListing(String),
    #[error("no checkout started for listing {0}")]
    NoCheckout(String),
    #[error(transparent)]
    DeliveryUnavailable(#[from] DeliveryClosed),
}

impl WorkflowError {
    /// True when repeating the same action may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            WorkflowError::BidNotAccepted(_) | WorkflowError::Backend(_) => true,
            WorkflowError::Payment(e) => matches!(
                e,
                CoordinatorError::Order(_) | CoordinatorError::Session(_) | CoordinatorError::Lookup(_)
            ),
            _ => false,
        }
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Bid(rejection) => match rejection {
                BidRejection::ListingNotActive(_) => {
                    "This listing is no longer taking bids.".into()
                }
                BidRejection::NotBiddable => "This listing is sold at a fixed price.".into(),
                BidRejection::InvalidAmount(_) => {
                    "Enter a positive amount with at most two decimals, e.g. 12.50.".into()
                }
                BidRejection::TooLow { floor } => {
                    format!("Your bid must be higher than {floor}.")
                }
            },
            WorkflowError::BidNotAccepted(e) if e.is_conflict() => {
                "Someone else bid first. The listing has been refreshed.".into()
            }
            WorkflowError::BidNotAccepted(_) => {
                "Your bid was not accepted. Please try again.".into()
            }
            WorkflowError::Checkout(e) | WorkflowError::Payment(CoordinatorError::Checkout(e)) => {
                checkout_message(e)
            }
            WorkflowError::Payment(CoordinatorError::Order(_)) => {
                "We could not create your order. Please try again.".into()
            }
            WorkflowError::Payment(CoordinatorError::Session(_))
            | WorkflowError::Payment(CoordinatorError::Lookup(_)) => {
                "The payment provider is not responding. Please try again.".into()
            }
            WorkflowError::Payment(CoordinatorError::InvalidReturnUrl) => {
                "Something went wrong starting the payment. Please reload the page.".into()
            }
            WorkflowError::Backend(_) => {
                "The marketplace could not be reached. Please try again.".into()
            }
            WorkflowError::UnknownListing(_) => "This listing could not be found.".into(),
            WorkflowError::NoCheckout(_) => "Start checkout from the listing page.".into(),
            WorkflowError::DeliveryUnavailable(_) => {
                "Live notifications are unavailable. Reload the page to reconnect.".into()
            }
        }
    }
}

fn checkout_message(e: &CheckoutError) -> String {
    match e {
        CheckoutError::MethodUnavailable(method) => {
            format!("{} is not available yet. Please pay by card.", method.label())
        }
        CheckoutError::ZeroQuantity => "Choose at least one unit.".into(),
        CheckoutError::ExceedsStock { available, .. } => {
            format!("Only {available} available.")
        }
        CheckoutError::TotalOverflow => "That order is too large.".into(),
        CheckoutError::InFlight => "A payment for this listing is already in progress.".into(),
        CheckoutError::OutOfOrder(_)
        | CheckoutError::AlreadyReconciled(_)
        | CheckoutError::Session(_) => {
            "Please start checkout again.".into()
        }
    }
}

/// What the presentation layer renders from.
#[derive(Debug, Default)]
pub struct WorkflowState {
    pub listings: HashMap<ListingId, ListingSnapshot>,
    pub checkouts: HashMap<ListingId, Checkout>,
    pub inbox: Inbox,
    pub open_chat: Option<ChatId>,
    pub last_error: Option<String>,
}

pub struct Workflow<B, G> {
    backend: B,
    gateway: G,
    endpoints: ReturnEndpoints,
    currency: String,
    delivery: Option<DeliveryHandle>,
    state: WorkflowState,
}

impl Workflow<HttpBackend, HttpGateway> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut backend = HttpBackend::new(&config.api_base_url);
        if let Some(token) = &config.api_token {
            backend = backend.with_token(token);
        }
        let gateway = HttpGateway::new(&config.gateway.base_url, &config.gateway.api_key);
        Ok(Self::new(
            backend,
            gateway,
            config.return_endpoints()?,
            &config.currency,
        ))
    }
}

impl<B: Backend, G: PaymentGateway> Workflow<B, G> {
    pub fn new(backend: B, gateway: G, endpoints: ReturnEndpoints, currency: &str) -> Self {
        Self {
            backend,
            gateway,
            endpoints,
            currency: currency.to_string(),
            delivery: None,
            state: WorkflowState::default(),
        }
    }

    /// Connect to a running delivery loop so chat changes reach it.
    pub fn with_delivery(mut self, delivery: DeliveryHandle) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn listing(&self, id: &ListingId) -> Option<&ListingSnapshot> {
        self.state.listings.get(id)
    }

    pub fn checkout(&self, id: &ListingId) -> Option<&Checkout> {
        self.state.checkouts.get(id)
    }

    fn record<T>(&mut self, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
        match &result {
            Ok(_) => self.state.last_error = None,
            Err(e) => {
                warn!(error = %e, "workflow operation failed");
                self.state.last_error = Some(e.user_message());
            }
        }
        result
    }

    // ---- listings & bids ----------------------------------------------

    pub async fn load_listing(&mut self, id: &ListingId) -> Result<ListingSnapshot, WorkflowError> {
        let result = self.fetch_listing(id).await;
        self.record(result)
    }

    async fn fetch_listing(&mut self, id: &ListingId) -> Result<ListingSnapshot, WorkflowError> {
        let mut snapshot = self.backend.listing(id).await?;
        snapshot.listing.expire_if_due(Utc::now());
        if let Some(checkout) = self.state.checkouts.get_mut(id) {
            checkout.refresh_listing(&snapshot.listing);
        }
        self.state.listings.insert(id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Refresh after a bid round trip. A failure here keeps the old snapshot.
    async fn refresh_listing(&mut self, id: &ListingId) {
        if let Err(e) = self.fetch_listing(id).await {
            warn!(listing = %id.0, error = %e, "listing refresh failed");
        }
    }

    pub async fn place_bid(
        &mut self,
        listing_id: &ListingId,
        amount: &str,
        company_id: Option<&str>,
    ) -> Result<Bid, WorkflowError> {
        let result = self.submit_bid(listing_id, amount, company_id).await;
        self.record(result)
    }

    async fn submit_bid(
        &mut self,
        listing_id: &ListingId,
        amount: &str,
        company_id: Option<&str>,
    ) -> Result<Bid, WorkflowError> {
        if !self.state.listings.contains_key(listing_id) {
            self.fetch_listing(listing_id).await?;
        }
        let snapshot = self
            .state
            .listings
            .get_mut(listing_id)
            .ok_or_else(|| WorkflowError::UnknownListing(listing_id.0.clone()))?;
        if snapshot.listing.expire_if_due(Utc::now()) {
            info!(listing = %listing_id.0, "listing expired");
        }
        let amount = bid::validate(amount, &snapshot.listing, snapshot.high_bid)?;
        let proposal = BidProposal::new(listing_id.clone(), amount, company_id);

        let outcome = self.backend.create_bid(&proposal).await;
        self.refresh_listing(listing_id).await;
        match outcome {
            Ok(bid) => {
                info!(listing = %listing_id.0, amount = %bid.amount, "bid placed");
                Ok(bid)
            }
            Err(e) => Err(WorkflowError::BidNotAccepted(e)),
        }
    }

    // ---- checkout ------------------------------------------------------

    pub fn select_payment_method(
        &mut self,
        listing_id: &ListingId,
        method: PaymentMethod,
    ) -> Result<(), WorkflowError> {
        let result = self.start_checkout(listing_id, method);
        self.record(result)
    }

    fn start_checkout(
        &mut self,
        listing_id: &ListingId,
        method: PaymentMethod,
    ) -> Result<(), WorkflowError> {
        let snapshot = self
            .state
            .listings
            .get(listing_id)
            .ok_or_else(|| WorkflowError::UnknownListing(listing_id.0.clone()))?;
        let checkout = self
            .state
            .checkouts
            .entry(listing_id.clone())
            .or_insert_with(|| Checkout::new(&snapshot.listing));
        checkout.select_method(method)?;
        Ok(())
    }

    /// Returns the order total for display.
    pub fn confirm_quantity(
        &mut self,
        listing_id: &ListingId,
        quantity: u32,
    ) -> Result<Amount, WorkflowError> {
        let result = match self.state.checkouts.get_mut(listing_id) {
            Some(checkout) => checkout.confirm_quantity(quantity).map_err(Into::into),
            None => Err(WorkflowError::NoCheckout(listing_id.0.clone())),
        };
        self.record(result)
    }

    /// Create the order and payment session. Returns the hosted checkout URL
    /// to navigate to; `return_url` is the page to land on afterwards.
    pub async fn submit_checkout(
        &mut self,
        listing_id: &ListingId,
        return_url: &str,
    ) -> Result<String, WorkflowError> {
        let result = match self.state.checkouts.get_mut(listing_id) {
            Some(checkout) => {
                let coordinator = PaymentCoordinator::new(
                    &self.backend,
                    &self.gateway,
                    &self.endpoints,
                    &self.currency,
                );
                coordinator
                    .request_session(checkout, return_url)
                    .await
                    .map(|redirect| redirect.checkout_url)
                    .map_err(Into::into)
            }
            None => Err(WorkflowError::NoCheckout(listing_id.0.clone())),
        };
        self.record(result)
    }

    /// Ask the gateway whether a redirected attempt has finished.
    pub async fn check_session(
        &mut self,
        listing_id: &ListingId,
    ) -> Result<Option<CheckoutOutcome>, WorkflowError> {
        let result = match self.state.checkouts.get_mut(listing_id) {
            Some(checkout) => {
                let coordinator = PaymentCoordinator::new(
                    &self.backend,
                    &self.gateway,
                    &self.endpoints,
                    &self.currency,
                );
                coordinator.poll_session(checkout).await.map_err(Into::into)
            }
            None => Err(WorkflowError::NoCheckout(listing_id.0.clone())),
        };
        self.record(result)
    }

    /// The page came back from the success endpoint. `location` is the full
    /// in-app URL it was loaded at. Safe to call repeatedly.
    ///
    /// Returns `None` when the location carries no purchase marker.
    pub async fn complete_return(
        &mut self,
        listing_id: &ListingId,
        location: &str,
    ) -> Result<Option<CheckoutOutcome>, WorkflowError> {
        if !has_success_marker(location) {
            return Ok(None);
        }
        let result = self.end_checkout(listing_id, CheckoutOutcome::Success).await;
        if result.is_ok() {
            // Stock moved; show the buyer the current listing.
            self.refresh_listing(listing_id).await;
        }
        self.record(result.map(Some))
    }

    /// The user abandoned payment and came back through the cancel endpoint.
    pub async fn cancel_checkout(&mut self, listing_id: &ListingId) -> Result<(), WorkflowError> {
        let result = self
            .end_checkout(listing_id, CheckoutOutcome::Cancelled)
            .await
            .map(drop);
        self.record(result)
    }

    async fn end_checkout(
        &mut self,
        listing_id: &ListingId,
        outcome: CheckoutOutcome,
    ) -> Result<CheckoutOutcome, WorkflowError> {
        if !self.state.checkouts.contains_key(listing_id) {
            // Fresh page after the gateway round trip.
            let snapshot = match self.state.listings.get(listing_id) {
                Some(snapshot) => snapshot.clone(),
                None => self.fetch_listing(listing_id).await?,
            };
            self.state
                .checkouts
                .insert(listing_id.clone(), Checkout::new(&snapshot.listing));
        }
        let checkout = self
            .state
            .checkouts
            .get_mut(listing_id)
            .ok_or_else(|| WorkflowError::NoCheckout(listing_id.0.clone()))?;
        if checkout.reconcile(outcome)? {
            info!(listing = %listing_id.0, ?outcome, "checkout finished");
        }
        Ok(outcome)
    }

    // ---- chat & notifications -----------------------------------------

    pub async fn open_chat(&mut self, chat_id: ChatId) -> Result<(), WorkflowError> {
        let result = self.show_chat(chat_id).await;
        self.record(result)
    }

    async fn show_chat(&mut self, chat_id: ChatId) -> Result<(), WorkflowError> {
        if let Some(delivery) = &self.delivery {
            delivery.chat_opened(chat_id.clone())?;
        }
        self.state.open_chat = Some(chat_id.clone());
        for id in self.state.inbox.mark_chat_read(&chat_id) {
            if let Err(e) = self.backend.mark_notification_read(&id).await {
                warn!(notification = %id.0, error = %e, "could not mark chat notification read");
            }
        }
        Ok(())
    }

    pub fn close_chat(&mut self) -> Result<(), WorkflowError> {
        self.state.open_chat = None;
        let result = match &self.delivery {
            Some(delivery) => delivery.chat_closed().map_err(Into::into),
            None => Ok(()),
        };
        self.record(result)
    }

    /// Fetch and merge notifications. Returns the unread count.
    pub async fn load_notifications(&mut self) -> Result<usize, WorkflowError> {
        let result = match self.backend.notifications().await {
            Ok(fetched) => {
                self.state.inbox.merge(fetched);
                Ok(self.state.inbox.unread_count())
            }
            Err(e) => Err(e.into()),
        };
        self.record(result)
    }

    pub async fn mark_notification_read(
        &mut self,
        id: &NotificationId,
    ) -> Result<(), WorkflowError> {
        let result = match self.backend.mark_notification_read(id).await {
            Ok(()) => {
                self.state.inbox.mark_read(id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        };
        self.record(result)
    }

    /// Returns how many notifications changed locally.
    pub async fn mark_all_notifications_read(&mut self) -> Result<usize, WorkflowError> {
        let result = match self.backend.mark_all_notifications_read().await {
            Ok(()) => Ok(self.state.inbox.mark_all_read()),
            Err(e) => Err(e.into()),
        };
        self.record(result)
    }
}
