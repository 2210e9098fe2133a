use reclaim_client::mock::sample_listing;
use reclaim_client::{Workflow, WorkflowError};
use reclaim_common::checkout::{CheckoutOutcome, CheckoutState};
use reclaim_common::listing::{ListingId, ListingStatus};
use reclaim_common::money::Amount;
use reclaim_common::order::OrderStatus;
use reclaim_common::payment::{GatewaySessionStatus, PaymentMethod};
use reclaim_integration::harness::TestEnv;
use reclaim_integration::{follow_once, no_redirect_client};

#[tokio::test]
async fn buy_now_through_gateway_and_back() {
    let env = TestEnv::start(true).await;
    let mut listing = sample_listing("lst-7", ListingStatus::Active, false);
    listing.starting_price = Amount::from_minor(1050);
    env.backend.insert_listing(listing, None);

    let id = ListingId("lst-7".into());
    let mut wf = Workflow::new(env.http_backend(), env.http_gateway(), env.endpoints(), "eur");
    wf.load_listing(&id).await.unwrap();
    wf.select_payment_method(&id, PaymentMethod::Card).unwrap();
    assert_eq!(wf.confirm_quantity(&id, 3).unwrap().to_string(), "31.50");

    let checkout_url = wf.submit_checkout(&id, "/orders/42").await.unwrap();
    assert!(checkout_url.starts_with("https://pay.test/c/"));

    let requests = env.gateway.requests();
    assert_eq!(requests.len(), 1);
    let (session_id, session) = &requests[0];
    assert_eq!(session.line_items[0].unit_amount, 1050);
    assert_eq!(session.line_items[0].quantity, 3);
    assert_eq!(session.client_reference.0, "ord-1");
    assert_eq!(session.metadata["paymentId"], "pay-1");

    // The user pays; the gateway sends the browser to the success URL with
    // the session id appended.
    env.gateway.set_status(session_id, GatewaySessionStatus::Paid);
    let client = no_redirect_client();
    let success = format!("{}&session_id={}", session.success_url, session_id.0);
    let (status, location) = follow_once(&client, &success).await;
    assert_eq!(status, 303);
    let location = location.unwrap();
    assert_eq!(location, "/orders/42?purchaseSuccess=1");

    // The app page loads at that location, twice (reload).
    for _ in 0..2 {
        assert_eq!(
            wf.complete_return(&id, &location).await.unwrap(),
            Some(CheckoutOutcome::Success)
        );
    }
    assert_eq!(
        wf.checkout(&id).unwrap().state(),
        &CheckoutState::Reconciled(CheckoutOutcome::Success)
    );

    let orders = env.backend.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Paid);
    assert_eq!(env.backend.confirmations().len(), 1);
}

#[tokio::test]
async fn cancelled_at_gateway() {
    let env = TestEnv::start(false).await;
    env.backend
        .insert_listing(sample_listing("lst-8", ListingStatus::Active, false), None);

    let id = ListingId("lst-8".into());
    let mut wf = Workflow::new(env.http_backend(), env.http_gateway(), env.endpoints(), "eur");
    wf.load_listing(&id).await.unwrap();
    wf.select_payment_method(&id, PaymentMethod::Card).unwrap();
    wf.confirm_quantity(&id, 1).unwrap();
    wf.submit_checkout(&id, "/listings/lst-8").await.unwrap();

    let requests = env.gateway.requests();
    let (_, session) = &requests[0];
    let (_, location) = follow_once(&no_redirect_client(), &session.cancel_url).await;
    let location = location.unwrap();
    assert_eq!(location, "/listings/lst-8");
    assert_eq!(wf.complete_return(&id, &location).await.unwrap(), None);

    wf.cancel_checkout(&id).await.unwrap();
    assert_eq!(
        wf.checkout(&id).unwrap().state(),
        &CheckoutState::Reconciled(CheckoutOutcome::Cancelled)
    );
    assert_eq!(env.backend.orders()[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn bids_over_http() {
    let env = TestEnv::start(false).await;
    env.backend
        .insert_listing(sample_listing("lst-9", ListingStatus::Active, true), None);

    let id = ListingId("lst-9".into());
    let mut wf = Workflow::new(env.http_backend(), env.http_gateway(), env.endpoints(), "eur");

    let bid = wf
        .place_bid(&id, "12.5", Some("3F2B8C1E-9A4D-4E7B-8C21-0D5F6A7B8C9D"))
        .await
        .unwrap();
    assert_eq!(bid.amount.to_string(), "12.50");
    assert_eq!(wf.listing(&id).unwrap().high_bid, Some(Amount::from_minor(1250)));

    // Another buyer outbids through the backend directly.
    env.backend.insert_listing(
        sample_listing("lst-9", ListingStatus::Active, true),
        Some(Amount::from_minor(2000)),
    );
    let err = wf.place_bid(&id, "13", None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::BidNotAccepted(ref e) if e.is_conflict()));
    assert_eq!(wf.listing(&id).unwrap().high_bid, Some(Amount::from_minor(2000)));

    let sent = env.backend.bids();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0].company_id.as_ref().map(|c| c.as_str()),
        Some("3f2b8c1e-9a4d-4e7b-8c21-0d5f6a7b8c9d")
    );
    assert!(sent[1].company_id.is_none());
}
