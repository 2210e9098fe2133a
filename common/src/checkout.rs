//! Per-attempt checkout state machine.
//!
//! `Idle → MethodSelected → QuantityConfirmed → SessionRequested → Redirected
//! → Reconciled(outcome)`. Network work happens outside; this type only records
//! where an attempt stands and refuses out-of-order steps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listing::{Listing, ListingId};
use crate::money::Amount;
use crate::order::{OrderId, PaymentId};
use crate::payment::{PaymentMethod, PaymentSession, SessionRegression, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Success,
    Cancelled,
    Expired,
}

impl CheckoutOutcome {
    fn session_status(self) -> SessionStatus {
        match self {
            CheckoutOutcome::Success => SessionStatus::Paid,
            CheckoutOutcome::Cancelled => SessionStatus::Unpaid,
            CheckoutOutcome::Expired => SessionStatus::Expired,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    Idle,
    MethodSelected {
        method: PaymentMethod,
    },
    QuantityConfirmed {
        method: PaymentMethod,
        quantity: u32,
        total: Amount,
    },
    SessionRequested {
        method: PaymentMethod,
        quantity: u32,
        total: Amount,
    },
    Redirected {
        order_id: OrderId,
        payment_id: PaymentId,
        session: PaymentSession,
    },
    Reconciled(CheckoutOutcome),
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Idle => "idle",
            CheckoutState::MethodSelected { .. } => "method_selected",
            CheckoutState::QuantityConfirmed { .. } => "quantity_confirmed",
            CheckoutState::SessionRequested { .. } => "session_requested",
            CheckoutState::Redirected { .. } => "redirected",
            CheckoutState::Reconciled(_) => "reconciled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("{} payments are not available yet", .0.label())]
    MethodUnavailable(PaymentMethod),
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("only {available} available, {requested} requested")]
    ExceedsStock { requested: u32, available: u32 },
    #[error("order total is too large")]
    TotalOverflow,
    #[error("a checkout is already in progress for this listing")]
    InFlight,
    #[error("checkout step not allowed while {0}")]
    OutOfOrder(&'static str),
    #[error("checkout already ended as {0:?}")]
    AlreadyReconciled(CheckoutOutcome),
    #[error(transparent)]
    Session(#[from] SessionRegression),
}

/// What the coordinator needs to create the order and the gateway session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub listing_id: ListingId,
    pub title: String,
    pub method: PaymentMethod,
    pub quantity: u32,
    pub unit_price: Amount,
    pub total: Amount,
}

/// One purchase intent for one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    listing_id: ListingId,
    title: String,
    unit_price: Amount,
    available: u32,
    state: CheckoutState,
}

impl Checkout {
    pub fn new(listing: &Listing) -> Self {
        Self {
            listing_id: listing.id.clone(),
            title: listing.title.clone(),
            unit_price: listing.starting_price,
            available: listing.stock_amount,
            state: CheckoutState::Idle,
        }
    }

    pub fn listing_id(&self) -> &ListingId {
        &self.listing_id
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// An attempt is in flight between requesting a session and coming back.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.state,
            CheckoutState::SessionRequested { .. } | CheckoutState::Redirected { .. }
        )
    }

    /// Pick up a fresher listing snapshot (price and stock) before confirming.
    pub fn refresh_listing(&mut self, listing: &Listing) {
        self.title = listing.title.clone();
        self.unit_price = listing.starting_price;
        self.available = listing.stock_amount;
    }

    pub fn select_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        // A reconciled attempt may be followed by a fresh one.
        if self.is_in_flight() {
            return Err(CheckoutError::InFlight);
        }
        if !method.is_operative() {
            return Err(CheckoutError::MethodUnavailable(method));
        }
        self.state = CheckoutState::MethodSelected { method };
        Ok(())
    }

    /// Confirm a quantity and return the display total.
    pub fn confirm_quantity(&mut self, quantity: u32) -> Result<Amount, CheckoutError> {
        let method = match self.state {
            CheckoutState::MethodSelected { method }
            | CheckoutState::QuantityConfirmed { method, .. } => method,
            ref other => return Err(CheckoutError::OutOfOrder(other.name())),
        };
        if quantity == 0 {
            return Err(CheckoutError::ZeroQuantity);
        }
        if quantity > self.available {
            return Err(CheckoutError::ExceedsStock {
                requested: quantity,
                available: self.available,
            });
        }
        let total = self
            .unit_price
            .checked_mul(quantity)
            .ok_or(CheckoutError::TotalOverflow)?;
        self.state = CheckoutState::QuantityConfirmed {
            method,
            quantity,
            total,
        };
        Ok(total)
    }

    pub fn begin_session_request(&mut self) -> Result<SessionPlan, CheckoutError> {
        if self.is_in_flight() {
            return Err(CheckoutError::InFlight);
        }
        let (method, quantity, total) = match self.state {
            CheckoutState::QuantityConfirmed {
                method,
                quantity,
                total,
            } => (method, quantity, total),
            ref other => return Err(CheckoutError::OutOfOrder(other.name())),
        };
        self.state = CheckoutState::SessionRequested {
            method,
            quantity,
            total,
        };
        Ok(SessionPlan {
            listing_id: self.listing_id.clone(),
            title: self.title.clone(),
            method,
            quantity,
            unit_price: self.unit_price,
            total,
        })
    }

    /// Order or session creation failed: back to method selection.
    pub fn abort_session_request(&mut self) {
        if let CheckoutState::SessionRequested { method, .. } = self.state {
            self.state = CheckoutState::MethodSelected { method };
        }
    }

    /// The gateway accepted the session; the user is about to leave.
    pub fn redirected(
        &mut self,
        order_id: OrderId,
        payment_id: PaymentId,
        mut session: PaymentSession,
    ) -> Result<(), CheckoutError> {
        if !matches!(self.state, CheckoutState::SessionRequested { .. }) {
            return Err(CheckoutError::OutOfOrder(self.state.name()));
        }
        // The hosted page is open from here on.
        session.advance(SessionStatus::Pending)?;
        self.state = CheckoutState::Redirected {
            order_id,
            payment_id,
            session,
        };
        Ok(())
    }

    /// Record how the attempt ended. Arriving twice with the same outcome is a
    /// no-op returning `Ok(false)`.
    ///
    /// Allowed from `Redirected` and from `Idle`, since a page that comes back
    /// from the gateway starts with fresh in-memory state.
    pub fn reconcile(&mut self, outcome: CheckoutOutcome) -> Result<bool, CheckoutError> {
        match &mut self.state {
            CheckoutState::Reconciled(done) if *done == outcome => Ok(false),
            CheckoutState::Reconciled(done) => Err(CheckoutError::AlreadyReconciled(*done)),
            CheckoutState::Redirected { session, .. } => {
                session.advance(outcome.session_status())?;
                self.state = CheckoutState::Reconciled(outcome);
                Ok(true)
            }
            CheckoutState::Idle => {
                self.state = CheckoutState::Reconciled(outcome);
                Ok(true)
            }
            other => Err(CheckoutError::OutOfOrder(other.name())),
        }
    }
}
