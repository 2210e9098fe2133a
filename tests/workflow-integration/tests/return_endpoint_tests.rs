use reclaim_common::order::OrderStatus;
use reclaim_common::payment::{GatewaySessionStatus, SessionId};
use reclaim_integration::harness::TestEnv;
use reclaim_integration::{follow_once, no_redirect_client};

#[tokio::test]
async fn success_joins_marker_onto_return_url() {
    let env = TestEnv::start(false).await;
    let client = no_redirect_client();

    let (status, location) = follow_once(&client, &env.success_url("pay-1", "/orders/42")).await;
    assert_eq!(status, 303);
    assert_eq!(location.as_deref(), Some("/orders/42?purchaseSuccess=1"));

    let (_, location) =
        follow_once(&client, &env.success_url("pay-2", "/orders/42?tab=items#top")).await;
    assert_eq!(
        location.as_deref(),
        Some("/orders/42?tab=items&purchaseSuccess=1#top")
    );
}

#[tokio::test]
async fn unverified_success_never_confirms() {
    let env = TestEnv::start(false).await;
    let client = no_redirect_client();
    let order = env.create_order(5000).await;

    let url = env.success_url(&order.payment_id.0, "/o");
    for _ in 0..2 {
        let (_, location) = follow_once(&client, &url).await;
        assert_eq!(location.as_deref(), Some("/o?purchaseSuccess=1"));
    }
    assert!(env.backend.confirmations().is_empty());
    assert_eq!(
        env.backend.order_status(&order.payment_id),
        Some(OrderStatus::Pending)
    );
}

#[tokio::test]
async fn repeated_verified_success_confirms_once() {
    let env = TestEnv::start(true).await;
    let client = no_redirect_client();
    let order = env.create_order(1000).await;
    let session = env.open_session(&order, "/orders").await;
    env.gateway.set_status(&session, GatewaySessionStatus::Paid);

    let url = env.success_url_for_session(&order.payment_id.0, "/orders", &session);
    for _ in 0..3 {
        let (status, location) = follow_once(&client, &url).await;
        assert_eq!(status, 303);
        assert_eq!(location.as_deref(), Some("/orders?purchaseSuccess=1"));
    }
    assert_eq!(env.backend.confirmations(), vec![order.payment_id.clone()]);
    assert_eq!(
        env.backend.order_status(&order.payment_id),
        Some(OrderStatus::Paid)
    );
}

#[tokio::test]
async fn paid_session_of_another_order_is_rejected() {
    let env = TestEnv::start(true).await;
    let client = no_redirect_client();
    let cheap = env.create_order(1).await;
    let pricey = env.create_order(1_000_000).await;
    let cheap_session = env.open_session(&cheap, "/o").await;
    env.gateway.set_status(&cheap_session, GatewaySessionStatus::Paid);

    let url = env.success_url_for_session(&pricey.payment_id.0, "/o", &cheap_session);
    let (_, location) = follow_once(&client, &url).await;
    assert_eq!(location.as_deref(), Some("/o"));
    assert_eq!(
        env.backend.order_status(&pricey.payment_id),
        Some(OrderStatus::Pending)
    );
    assert!(env.backend.confirmations().is_empty());
}

#[tokio::test]
async fn missing_payment_id_sends_user_home() {
    let env = TestEnv::start(false).await;
    let client = no_redirect_client();
    let url = format!("{}/payment/success?returnUrl=%2Forders%2F42", env.returns_url);
    let (status, location) = follow_once(&client, &url).await;
    assert_eq!(status, 303);
    assert_eq!(location.as_deref(), Some("/"));
    assert!(env.backend.confirmations().is_empty());
}

#[tokio::test]
async fn repeated_parameters_send_user_home() {
    let env = TestEnv::start(false).await;
    let client = no_redirect_client();
    for path in [
        "/payment/success?payment_id=pay-1&payment_id=pay-2&returnUrl=%2Fo",
        "/payment/success?payment_id=pay-1&returnUrl=%2Fo&returnUrl=%2Fp",
        "/payment/cancel?payment_id=pay-1&returnUrl=%2Fo&returnUrl=%2Fp",
    ] {
        let (status, location) = follow_once(&client, &format!("{}{path}", env.returns_url)).await;
        assert_eq!(status, 303, "{path}");
        assert_eq!(location.as_deref(), Some("/"), "{path}");
    }
}

#[tokio::test]
async fn cancel_returns_without_marker() {
    let env = TestEnv::start(false).await;
    let client = no_redirect_client();
    let (status, location) = follow_once(&client, &env.cancel_url("pay-9", "/listings/7")).await;
    assert_eq!(status, 303);
    assert_eq!(location.as_deref(), Some("/listings/7"));
    assert!(env.backend.confirmations().is_empty());
}

#[tokio::test]
async fn health_reports_mode() {
    let env = TestEnv::start(true).await;
    let body: serde_json::Value = reqwest::get(format!("{}/health", env.returns_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["verify_sessions"], true);
}

#[tokio::test]
async fn verified_success_needs_a_paid_session() {
    let env = TestEnv::start(true).await;
    let client = no_redirect_client();
    let order = env.create_order(4500).await;
    let session = env.open_session(&order, "/orders/1").await;
    let pay = &order.payment_id.0;

    // Unpaid: no marker.
    let (_, location) =
        follow_once(&client, &env.success_url_for_session(pay, "/orders/1", &session)).await;
    assert_eq!(location.as_deref(), Some("/orders/1"));

    // No session id at all: no marker.
    let (_, location) = follow_once(&client, &env.success_url(pay, "/orders/1")).await;
    assert_eq!(location.as_deref(), Some("/orders/1"));

    // Unknown session: no marker.
    let unknown = SessionId("cs_nope".into());
    let (_, location) =
        follow_once(&client, &env.success_url_for_session(pay, "/orders/1", &unknown)).await;
    assert_eq!(location.as_deref(), Some("/orders/1"));

    // A session id that tries to leave its path segment is refused before any lookup.
    let url = format!(
        "{}&session_id=..%2F..%2Fx",
        env.success_url(pay, "/orders/1")
    );
    let (_, location) = follow_once(&client, &url).await;
    assert_eq!(location.as_deref(), Some("/orders/1"));
    assert_eq!(env.gateway.lookups(), 2);

    assert!(env.backend.confirmations().is_empty());

    env.gateway.set_status(&session, GatewaySessionStatus::Paid);
    let (_, location) =
        follow_once(&client, &env.success_url_for_session(pay, "/orders/1", &session)).await;
    assert_eq!(location.as_deref(), Some("/orders/1?purchaseSuccess=1"));
    assert_eq!(env.backend.confirmations(), vec![order.payment_id.clone()]);
}
