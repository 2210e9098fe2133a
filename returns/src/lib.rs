//! Payment gateway return endpoints.
//!
//! The gateway sends the browser to `GET /payment/success` or
//! `GET /payment/cancel` with `payment_id` and `returnUrl` in the query. Both
//! answer with `303 See Other` back into the application; success appends
//! `purchaseSuccess=1` so the page knows to reconcile.
//!
//! The backend only hears about a payment once the gateway has confirmed the
//! session is paid and was opened for that payment id. Without session
//! verification the marker is appended but nothing leaves this service.
//!
//! Anything unusable (no payment id, a repeated parameter, a foreign return
//! URL) ends at `/`.

pub mod ledger;

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::Method;
use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use reclaim_client::{Backend, HttpBackend, HttpGateway, PaymentGateway};
use reclaim_common::order::PaymentId;
use reclaim_common::payment::SessionId;
use reclaim_common::return_url::{self, ReturnKind, ReturnParams, APP_ROOT};

use crate::ledger::{Arrival, ReconciliationLedger};

/// Shared state of the return service.
#[derive(Default)]
pub struct AppState {
    pub ledger: ReconciliationLedger,
    backend: Option<HttpBackend>,
    verifier: Option<HttpGateway>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(mut self, ledger: ReconciliationLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Report first verified success arrivals to the marketplace backend.
    /// Has no effect without session verification.
    pub fn with_backend(mut self, backend: HttpBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Only mark a purchase successful once the gateway says the session is
    /// paid and belongs to the payment.
    pub fn with_session_verification(mut self, gateway: HttpGateway) -> Self {
        self.verifier = Some(gateway);
        self
    }

    pub fn verifies_sessions(&self) -> bool {
        self.verifier.is_some()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    settled: usize,
    verify_sessions: bool,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        settled: state.ledger.len().await,
        verify_sessions: state.verifies_sessions(),
    })
}

type RawQuery = Result<Query<Vec<(String, String)>>, QueryRejection>;

fn return_params(query: RawQuery) -> Option<ReturnParams> {
    let Query(pairs) = match query {
        Ok(query) => query,
        Err(e) => {
            warn!(error = %e, "unreadable return query");
            return None;
        }
    };
    match ReturnParams::from_pairs(pairs) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!(error = %e, "ambiguous return query");
            None
        }
    }
}

async fn success_handler(State(state): State<Arc<AppState>>, query: RawQuery) -> Redirect {
    let Some(params) = return_params(query) else {
        return Redirect::to(APP_ROOT);
    };
    let redirect = match return_url::resolve(ReturnKind::Success, &params) {
        Ok(redirect) => redirect,
        Err(e) => {
            warn!(error = %e, "success return without usable payment id");
            return Redirect::to(APP_ROOT);
        }
    };
    let payment_id = &redirect.payment_id;

    let verified = match &state.verifier {
        Some(gateway) => {
            if !session_settles(gateway, &params, payment_id).await {
                return Redirect::to(params.return_target());
            }
            true
        }
        None => false,
    };

    match state.ledger.settle(payment_id).await {
        Arrival::First => {
            info!(payment = %payment_id.0, verified, "payment settled");
            if let (true, Some(backend)) = (verified, &state.backend) {
                if let Err(e) = backend.confirm_payment(payment_id).await {
                    warn!(payment = %payment_id.0, error = %e, "backend confirmation failed");
                    state.ledger.forget(payment_id).await;
                }
            }
        }
        Arrival::Repeat => debug!(payment = %payment_id.0, "repeat success arrival"),
    }
    Redirect::to(&redirect.location)
}

async fn cancel_handler(query: RawQuery) -> Redirect {
    let Some(params) = return_params(query) else {
        return Redirect::to(APP_ROOT);
    };
    match return_url::resolve(ReturnKind::Cancel, &params) {
        Ok(redirect) => {
            info!(payment = %redirect.payment_id.0, "checkout cancelled");
            Redirect::to(&redirect.location)
        }
        Err(e) => {
            warn!(error = %e, "cancel return without usable payment id");
            Redirect::to(APP_ROOT)
        }
    }
}

/// True when the gateway reports the session in the query as paid and opened
/// for `payment_id`.
async fn session_settles(gateway: &HttpGateway, params: &ReturnParams, payment_id: &PaymentId) -> bool {
    let Some(id) = params
        .session_id
        .as_deref()
        .map(str::trim)
        .and_then(SessionId::parse)
    else {
        warn!(payment = %payment_id.0, "session verification on but no usable session id");
        return false;
    };
    match gateway.session_details(&id).await {
        Ok(details) if details.settles(payment_id) => true,
        Ok(details) => {
            warn!(
                session = %id,
                payment = %payment_id.0,
                status = ?details.status,
                reference = ?details.payment_reference(),
                "session does not settle this payment"
            );
            false
        }
        Err(e) => {
            warn!(session = %id, gateway = gateway.gateway_name(), error = %e, "session lookup failed");
            false
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/payment/success", get(success_handler))
        .route("/payment/cancel", get(cancel_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the return endpoints on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
