use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tollgate_api::{app, AppState};
use tollgate_engine::{EngineSettings, EntitlementServices, ServiceDeps};
use tollgate_shared::{products, IntroductoryOffer, Offer, PeriodUnit, SubscriptionPeriod};
use tollgate_store::{MemoryOverrideStore, SandboxLedger};
use tokio_stream::StreamExt;
use tower::ServiceExt;

async fn test_app() -> (Arc<SandboxLedger>, Router) {
    let offers = vec![
        Offer::new(products::YEARLY_SUBSCRIPTION, Decimal::new(4499, 2), "$44.99", PeriodUnit::Year),
        Offer::new(products::WEEKLY_SUBSCRIPTION, Decimal::new(499, 2), "$4.99", PeriodUnit::Week)
            .with_introductory_offer(IntroductoryOffer {
                price: Decimal::ZERO,
                display_price: "Free".to_string(),
                period: SubscriptionPeriod::new(PeriodUnit::Day, 3),
            }),
    ];
    let ledger = Arc::new(SandboxLedger::with_offers(offers));
    let deps = ServiceDeps {
        offers: ledger.clone(),
        ledger: ledger.clone(),
        platform: ledger.clone(),
        overrides: Arc::new(MemoryOverrideStore::new(false)),
    };
    let services = EntitlementServices::start(deps, EngineSettings::default()).await;
    (ledger, app(AppState::new(services)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_initial_entitlement_is_denied() {
    let (_ledger, app) = test_app().await;

    let (status, body) = call(&app, Method::GET, "/v1/entitlement", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_subscribed"], json!(false));
    assert_eq!(body["status"], json!("DENIED"));
    assert_eq!(body["source"], json!("LEDGER"));
}

#[tokio::test]
async fn test_override_round_trip() {
    let (_ledger, app) = test_app().await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/v1/entitlement/override",
        Some(json!({ "active": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_subscribed"], json!(true));
    assert_eq!(body["source"], json!("OVERRIDE"));
    assert_eq!(body["purchased_product_ids"], json!([]));

    let (_, body) = call(
        &app,
        Method::PUT,
        "/v1/entitlement/override",
        Some(json!({ "active": false })),
    )
    .await;
    assert_eq!(body["is_subscribed"], json!(false));
}

#[tokio::test]
async fn test_offers_are_sorted_with_labels() {
    let (_ledger, app) = test_app().await;

    let (status, body) = call(&app, Method::GET, "/v1/offers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loading"], json!(false));

    let offers = body["offers"].as_array().unwrap();
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0]["id"], json!(products::WEEKLY_SUBSCRIPTION));
    assert_eq!(offers[0]["price_label"], json!("$4.99 / week"));
    assert_eq!(offers[0]["trial_badge"], json!("3 DAYS FREE"));
    assert_eq!(offers[1]["trial_badge"], Value::Null);
}

#[tokio::test]
async fn test_purchase_flow() {
    let (_ledger, app) = test_app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/purchases",
        Some(json!({ "offer_id": products::WEEKLY_SUBSCRIPTION })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("COMPLETED"));
    assert_eq!(body["entitlement"]["status"], json!("GRANTED"));

    let (_, body) = call(&app, Method::GET, "/v1/entitlement", None).await;
    assert_eq!(body["is_subscribed"], json!(true));
}

#[tokio::test]
async fn test_purchase_unknown_offer() {
    let (_ledger, app) = test_app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/purchases",
        Some(json!({ "offer_id": "lifetime" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("lifetime"));
}

#[tokio::test]
async fn test_restore_reports_sync_failure_without_revoking() {
    let (ledger, app) = test_app().await;
    ledger.grant(products::YEARLY_SUBSCRIPTION, None);
    ledger.set_sync_failure(Some("no network"));

    let (status, body) = call(&app, Method::POST, "/v1/restore", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["sync_error"].as_str().unwrap().contains("no network"));
    assert_eq!(body["is_subscribed"], json!(true));
}

#[tokio::test]
async fn test_refresh_during_outage_keeps_snapshot() {
    let (ledger, app) = test_app().await;
    ledger.grant(products::WEEKLY_SUBSCRIPTION, None);

    let (_, granted) = call(&app, Method::POST, "/v1/entitlement/refresh", None).await;
    assert_eq!(granted["is_subscribed"], json!(true));

    ledger.set_ledger_failure(Some("timeout"));
    let (status, after) = call(&app, Method::POST, "/v1/entitlement/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after, granted);
}

/// Reads body chunks until a complete `entitlement` event arrives and returns its data
async fn next_entitlement_event<S>(body: &mut S) -> Value
where
    S: tokio_stream::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    let mut buffer = String::new();
    loop {
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), body.next())
            .await
            .expect("no event within timeout")
            .expect("stream ended")
            .unwrap();
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());

        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            if !frame.lines().any(|l| l == "event: entitlement") {
                continue;
            }
            let data = frame
                .lines()
                .find_map(|l| l.strip_prefix("data: "))
                .expect("event without data");
            return serde_json::from_str(data).unwrap();
        }
    }
}

#[tokio::test]
async fn test_entitlement_stream_emits_current_then_changes() {
    let (_ledger, app) = test_app().await;

    let request = Request::builder()
        .uri("/v1/entitlement/stream")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut body = response.into_body().into_data_stream();
    let first = next_entitlement_event(&mut body).await;
    assert_eq!(first["is_subscribed"], json!(false));
    assert_eq!(first["status"], json!("DENIED"));

    call(
        &app,
        Method::PUT,
        "/v1/entitlement/override",
        Some(json!({ "active": true })),
    )
    .await;
    let next = next_entitlement_event(&mut body).await;
    assert_eq!(next["is_subscribed"], json!(true));
    assert_eq!(next["source"], json!("OVERRIDE"));
}
