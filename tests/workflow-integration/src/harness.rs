//! Live stand-ins for the marketplace backend and the payment gateway, plus
//! the real return service, all on ephemeral ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use reclaim_client::config::ReturnEndpoints;
use reclaim_client::{Backend, HttpBackend, HttpGateway, PaymentGateway};
use reclaim_common::bid::{Bid, BidId, BidProposal};
use reclaim_common::identity::UserId;
use reclaim_common::listing::{Listing, ListingId, ListingSnapshot};
use reclaim_common::money::Amount;
use reclaim_common::order::{
    CreateOrderRequest, Order, OrderId, OrderItem, OrderStatus, PaymentId,
};
use reclaim_common::payment::{
    CreateSessionRequest, CreatedSession, GatewaySessionStatus, LineItem, PaymentMethod,
    SessionDetails, SessionId,
};
use reclaim_common::return_url::SESSION_ID_PARAM;
use reclaim_returns::AppState;

use crate::spawn_router;

pub const GATEWAY_KEY: &str = "sk_test_reclaim";

// ─── Gateway ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct GatewayStub {
    requests: Mutex<Vec<(SessionId, CreateSessionRequest)>>,
    statuses: Mutex<HashMap<SessionId, GatewaySessionStatus>>,
    lookups: AtomicUsize,
}

impl GatewayStub {
    pub fn requests(&self) -> Vec<(SessionId, CreateSessionRequest)> {
        self.requests.lock().unwrap().clone()
    }

    /// Session-details requests received so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, id: &SessionId, status: GatewaySessionStatus) {
        self.statuses.lock().unwrap().insert(id.clone(), status);
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {GATEWAY_KEY}"))
        .unwrap_or(false)
}

async fn create_session(
    State(stub): State<Arc<GatewayStub>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    let mut requests = stub.requests.lock().unwrap();
    let id = SessionId(format!("cs_test_{}", requests.len() + 1));
    requests.push((id.clone(), request));
    stub.statuses
        .lock()
        .unwrap()
        .insert(id.clone(), GatewaySessionStatus::Unpaid);
    Json(CreatedSession {
        url: format!("https://pay.test/c/{}", id.0),
        id,
    })
    .into_response()
}

async fn session_details(
    State(stub): State<Arc<GatewayStub>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing api key").into_response();
    }
    stub.lookups.fetch_add(1, Ordering::SeqCst);
    let id = SessionId(id);
    let requests = stub.requests.lock().unwrap();
    let Some((_, request)) = requests.iter().find(|(known, _)| known == &id) else {
        return (StatusCode::NOT_FOUND, "no such session").into_response();
    };
    let status = stub.statuses.lock().unwrap()[&id];
    Json(SessionDetails {
        status,
        amount_total: request
            .line_items
            .iter()
            .map(|i| i.unit_amount * u64::from(i.quantity))
            .sum(),
        currency: request.currency.clone(),
        metadata: request
            .metadata
            .clone()
            .into_iter()
            .chain([("clientReference".to_string(), request.client_reference.0.clone())])
            .collect(),
    })
    .into_response()
}

pub fn gateway_router(stub: Arc<GatewayStub>) -> Router {
    Router::new()
        .route("/checkout/sessions", post(create_session))
        .route("/checkout/sessions/{id}", get(session_details))
        .with_state(stub)
}

// ─── Backend ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BackendStub {
    listings: Mutex<HashMap<String, ListingSnapshot>>,
    bids: Mutex<Vec<BidProposal>>,
    orders: Mutex<Vec<Order>>,
    confirmations: Mutex<Vec<PaymentId>>,
}

impl BackendStub {
    pub fn insert_listing(&self, listing: Listing, high_bid: Option<Amount>) {
        self.listings
            .lock()
            .unwrap()
            .insert(listing.id.0.clone(), ListingSnapshot { listing, high_bid });
    }

    pub fn bids(&self) -> Vec<BidProposal> {
        self.bids.lock().unwrap().clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn order_status(&self, payment_id: &PaymentId) -> Option<OrderStatus> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| &o.payment_id == payment_id)
            .map(|o| o.status)
    }

    pub fn confirmations(&self) -> Vec<PaymentId> {
        self.confirmations.lock().unwrap().clone()
    }
}

async fn get_listing(State(stub): State<Arc<BackendStub>>, Path(id): Path<String>) -> Response {
    match stub.listings.lock().unwrap().get(&id) {
        Some(snapshot) => Json(snapshot.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "listing not found" })))
            .into_response(),
    }
}

async fn post_bid(State(stub): State<Arc<BackendStub>>, Json(proposal): Json<BidProposal>) -> Response {
    let mut listings = stub.listings.lock().unwrap();
    let Some(snapshot) = listings.get_mut(&proposal.listing_id.0) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "listing not found" })))
            .into_response();
    };
    stub.bids.lock().unwrap().push(proposal.clone());
    if proposal.amount <= snapshot.listing.bid_floor(snapshot.high_bid) {
        return (StatusCode::CONFLICT, Json(json!({ "message": "a higher bid was placed" })))
            .into_response();
    }
    snapshot.high_bid = Some(proposal.amount);
    Json(Bid {
        id: BidId(format!("bid-{}", stub.bids.lock().unwrap().len())),
        listing_id: proposal.listing_id,
        bidder: UserId("buyer-1".into()),
        amount: proposal.amount,
        created_at: Utc::now(),
    })
    .into_response()
}

async fn post_order(
    State(stub): State<Arc<BackendStub>>,
    Json(request): Json<CreateOrderRequest>,
) -> Json<Order> {
    let mut orders = stub.orders.lock().unwrap();
    let n = orders.len() + 1;
    let total = request
        .items
        .iter()
        .filter_map(|i| i.line_total())
        .fold(Amount::ZERO, |acc, line| acc.checked_add(line).unwrap());
    let order = Order {
        id: OrderId(format!("ord-{n}")),
        payment_id: PaymentId(format!("pay-{n}")),
        buyer: UserId("buyer-1".into()),
        seller: UserId("seller-1".into()),
        items: request.items,
        total_amount: total,
        status: OrderStatus::Pending,
    };
    orders.push(order.clone());
    Json(order)
}

async fn confirm_payment(
    State(stub): State<Arc<BackendStub>>,
    Path(payment_id): Path<String>,
) -> StatusCode {
    let payment_id = PaymentId(payment_id);
    let mut orders = stub.orders.lock().unwrap();
    match orders.iter_mut().find(|o| o.payment_id == payment_id) {
        Some(order) => {
            order.transition_to(OrderStatus::Paid).unwrap();
            stub.confirmations.lock().unwrap().push(payment_id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub fn backend_router(stub: Arc<BackendStub>) -> Router {
    Router::new()
        .route("/listings/{id}", get(get_listing))
        .route("/bids", post(post_bid))
        .route("/orders", post(post_order))
        .route("/notifications", get(|| async { Json(json!([])) }))
        .route("/payments/{id}/confirm", post(confirm_payment))
        .with_state(stub)
}

// ─── Environment ────────────────────────────────────────────────────────────

pub struct TestEnv {
    pub gateway: Arc<GatewayStub>,
    pub gateway_url: String,
    pub backend: Arc<BackendStub>,
    pub backend_url: String,
    pub returns_url: String,
}

impl TestEnv {
    /// Start the gateway and backend stand-ins and a return service wired to
    /// them. `verify_sessions` switches on the gateway lookup at success.
    pub async fn start(verify_sessions: bool) -> Self {
        tracing_subscriber::fmt::try_init().ok();

        let gateway = Arc::new(GatewayStub::default());
        let gateway_url = spawn_router(gateway_router(gateway.clone())).await;
        let backend = Arc::new(BackendStub::default());
        let backend_url = spawn_router(backend_router(backend.clone())).await;

        let mut state = AppState::new().with_backend(HttpBackend::new(&backend_url));
        if verify_sessions {
            state = state.with_session_verification(HttpGateway::new(&gateway_url, GATEWAY_KEY));
        }
        let returns_url = spawn_router(reclaim_returns::router(Arc::new(state))).await;

        Self {
            gateway,
            gateway_url,
            backend,
            backend_url,
            returns_url,
        }
    }

    pub fn endpoints(&self) -> ReturnEndpoints {
        ReturnEndpoints::new(
            &format!("{}/payment/success", self.returns_url),
            &format!("{}/payment/cancel", self.returns_url),
        )
        .expect("return endpoints")
    }

    pub fn http_backend(&self) -> HttpBackend {
        HttpBackend::new(&self.backend_url)
    }

    pub fn http_gateway(&self) -> HttpGateway {
        HttpGateway::new(&self.gateway_url, GATEWAY_KEY)
    }

    pub fn success_url(&self, payment_id: &str, return_url: &str) -> String {
        let (success, _) = self
            .endpoints()
            .for_payment(&PaymentId(payment_id.into()), return_url);
        success
    }

    /// The success URL as a gateway that echoes the session id sends it.
    pub fn success_url_for_session(
        &self,
        payment_id: &str,
        return_url: &str,
        session: &SessionId,
    ) -> String {
        format!(
            "{}&{SESSION_ID_PARAM}={}",
            self.success_url(payment_id, return_url),
            session.0
        )
    }

    /// A pending single-item order for `unit_minor` on the backend.
    pub async fn create_order(&self, unit_minor: u64) -> Order {
        self.http_backend()
            .create_order(&CreateOrderRequest {
                items: vec![OrderItem {
                    listing_id: ListingId("lst-1".into()),
                    quantity: 1,
                    unit_price: Amount::from_minor(unit_minor),
                }],
                payment_method: PaymentMethod::Card,
            })
            .await
            .expect("create order")
    }

    /// A gateway session opened for `order`, the way checkout opens one.
    pub async fn open_session(&self, order: &Order, return_url: &str) -> SessionId {
        let (success_url, cancel_url) = self.endpoints().for_payment(&order.payment_id, return_url);
        let request = CreateSessionRequest {
            line_items: vec![LineItem {
                name: "Copper cable offcuts".into(),
                quantity: 1,
                unit_amount: order.total_amount.minor_units(),
            }],
            client_reference: order.id.clone(),
            currency: "eur".into(),
            success_url,
            cancel_url,
            metadata: Default::default(),
        }
        .with_payment_reference(&order.payment_id);
        self.http_gateway()
            .create_session(&request)
            .await
            .expect("create session")
            .id
    }

    pub fn cancel_url(&self, payment_id: &str, return_url: &str) -> String {
        let (_, cancel) = self
            .endpoints()
            .for_payment(&PaymentId(payment_id.into()), return_url);
        cancel
    }
}
