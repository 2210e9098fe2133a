//! Payment session coordinator.
//!
//! Drives one checkout attempt through order creation and gateway session
//! creation, and reconciles what the gateway reports afterwards. The
//! [`Checkout`] state machine records progress; this module does the I/O.

use thiserror::Error;
use tracing::{info, warn};

use reclaim_common::checkout::{Checkout, CheckoutError, CheckoutOutcome, CheckoutState};
use reclaim_common::order::{CreateOrderRequest, OrderId, OrderItem, PaymentId};
use reclaim_common::payment::{
    CreateSessionRequest, GatewaySessionStatus, LineItem, PaymentSession, SessionStatus,
};
use reclaim_common::return_url::is_local_path;

use crate::backend::{Backend, BackendError};
use crate::config::ReturnEndpoints;
use crate::gateway::{GatewayError, PaymentGateway};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
    #[error("could not create order: {0}")]
    Order(#[source] BackendError),
    #[error("could not open payment session: {0}")]
    Session(#[source] GatewayError),
    #[error("could not look up payment session: {0}")]
    Lookup(#[source] GatewayError),
    #[error("return url must be an in-app path")]
    InvalidReturnUrl,
}

/// Where to send the browser once the session exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub checkout_url: String,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
}

pub struct PaymentCoordinator<'a, B, G> {
    backend: &'a B,
    gateway: &'a G,
    endpoints: &'a ReturnEndpoints,
    currency: &'a str,
}

impl<'a, B: Backend, G: PaymentGateway> PaymentCoordinator<'a, B, G> {
    pub fn new(
        backend: &'a B,
        gateway: &'a G,
        endpoints: &'a ReturnEndpoints,
        currency: &'a str,
    ) -> Self {
        Self {
            backend,
            gateway,
            endpoints,
            currency,
        }
    }

    /// Create the order, then the gateway session, and move `checkout` to
    /// `Redirected`. Either failure puts the checkout back to method selection.
    ///
    /// `return_url` is the in-app page the user lands on afterwards.
    pub async fn request_session(
        &self,
        checkout: &mut Checkout,
        return_url: &str,
    ) -> Result<CheckoutRedirect, CoordinatorError> {
        if !is_local_path(return_url) {
            return Err(CoordinatorError::InvalidReturnUrl);
        }
        let plan = checkout.begin_session_request()?;

        let order_request = CreateOrderRequest {
            items: vec![OrderItem {
                listing_id: plan.listing_id.clone(),
                quantity: plan.quantity,
                unit_price: plan.unit_price,
            }],
            payment_method: plan.method,
        };
        let order = match self.backend.create_order(&order_request).await {
            Ok(order) => order,
            Err(e) => {
                warn!(listing = %plan.listing_id.0, error = %e, "order creation failed");
                checkout.abort_session_request();
                return Err(CoordinatorError::Order(e));
            }
        };

        let (success_url, cancel_url) = self.endpoints.for_payment(&order.payment_id, return_url);
        let session_request = CreateSessionRequest {
            line_items: vec![LineItem {
                name: plan.title.clone(),
                quantity: plan.quantity,
                unit_amount: plan.unit_price.minor_units(),
            }],
            client_reference: order.id.clone(),
            currency: self.currency.to_string(),
            success_url: success_url.clone(),
            cancel_url: cancel_url.clone(),
            metadata: Default::default(),
        }
        .with_payment_reference(&order.payment_id);
        let created = match self.gateway.create_session(&session_request).await {
            Ok(created) => created,
            Err(e) => {
                // The order stays pending on the backend; a retry creates a new one.
                warn!(
                    order = %order.id.0,
                    gateway = self.gateway.gateway_name(),
                    error = %e,
                    "checkout session creation failed"
                );
                checkout.abort_session_request();
                return Err(CoordinatorError::Session(e));
            }
        };

        let session = PaymentSession {
            id: created.id,
            client_reference: order.id.clone(),
            status: SessionStatus::Created,
            checkout_url: created.url.clone(),
            success_url,
            cancel_url,
        };
        info!(
            order = %order.id.0,
            payment = %order.payment_id.0,
            session = %session.id,
            total = %plan.total,
            "handing off to gateway"
        );
        checkout.redirected(order.id.clone(), order.payment_id.clone(), session)?;

        Ok(CheckoutRedirect {
            checkout_url: created.url,
            order_id: order.id,
            payment_id: order.payment_id,
        })
    }

    /// Ask the gateway how a redirected attempt stands and reconcile terminal
    /// outcomes. `Ok(None)` while the user has not finished paying.
    pub async fn poll_session(
        &self,
        checkout: &mut Checkout,
    ) -> Result<Option<CheckoutOutcome>, CoordinatorError> {
        let session_id = match checkout.state() {
            CheckoutState::Redirected { session, .. } => session.id.clone(),
            CheckoutState::Reconciled(outcome) => return Ok(Some(*outcome)),
            other => return Err(CheckoutError::OutOfOrder(other.name()).into()),
        };
        let details = self
            .gateway
            .session_details(&session_id)
            .await
            .map_err(CoordinatorError::Lookup)?;
        let outcome = match details.status {
            GatewaySessionStatus::Paid => CheckoutOutcome::Success,
            GatewaySessionStatus::Expired => CheckoutOutcome::Expired,
            GatewaySessionStatus::Unpaid => return Ok(None),
        };
        if checkout.reconcile(outcome)? {
            info!(session = %session_id, ?outcome, "checkout reconciled from gateway status");
        }
        Ok(Some(outcome))
    }
}
