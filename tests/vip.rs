//! VIP status lookups and the polling paths (charge refresh, subscriber sync)
//! used when notifications never arrive.

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::*;

#[tokio::test]
async fn test_unknown_subscriber_is_not_vip() {
    let app = TestApp::new().await;

    let (status, body) = app.send_json(get_request("/vip/nobody")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriber"], "nobody");
    assert_eq!(body["vip"], false);
    assert!(body["expires_at"].is_null());
    assert_eq!(body["remaining_seconds"], 0);
}

#[tokio::test]
async fn test_active_and_expired_vip() {
    let app = TestApp::new().await;
    {
        let conn = app.pool.get().unwrap();
        queries::extend_vip(&conn, "active-user", None, 5, now()).unwrap();
        queries::extend_vip(&conn, "expired-user", None, 1, now() - 2 * 86400).unwrap();
    }

    let (_, body) = app.send_json(get_request("/vip/active-user")).await;
    assert_eq!(body["vip"], true);
    let remaining = body["remaining_seconds"].as_i64().unwrap();
    assert!(remaining > 4 * 86400 && remaining <= 5 * 86400);

    let (_, body) = app.send_json(get_request("/vip/expired-user")).await;
    assert_eq!(body["vip"], false);
    assert!(body["expires_at"].is_i64());
    assert_eq!(body["remaining_seconds"], 0);
}

#[tokio::test]
async fn test_check_vip_query_forms() {
    let app = TestApp::new().await;
    {
        let conn = app.pool.get().unwrap();
        queries::extend_vip(&conn, "user-7", None, 30, now()).unwrap();
        queries::extend_vip(&conn, "ana@example.com", Some("ana@example.com"), 30, now()).unwrap();
    }

    for uri in [
        "/check-vip?user_id=user-7",
        "/check-vip?userId=user-7",
        "/check-vip?email=Ana%40Example.com",
        "/vip/ANA@example.com",
    ] {
        let (status, body) = app.send_json(get_request(uri)).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["vip"], true, "{}: {}", uri, body);
    }

    let (status, _) = app.send_json(get_request("/check-vip")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_charge_applies_provider_status() {
    let app = TestApp::new().await;
    let created = app
        .create_charge(json!({"user_id": "user-1", "email": "a@example.com", "amount": 10}))
        .await;
    let id = created["id"].as_str().unwrap();
    let payment_id: i64 = created["payment_id"].as_str().unwrap().parse().unwrap();

    let (status, body) = app
        .send_json(post_empty(&format!("/charges/{}/refresh", id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["charge"]["status"], "pending");
    assert_eq!(body["reconcile"]["outcome"], "updated");
    assert_eq!(body["vip"]["vip"], false);

    app.provider.set_status(payment_id, "approved");
    let (status, body) = app
        .send_json(post_empty(&format!("/charges/{}/refresh", id)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["charge"]["status"], "approved");
    assert_eq!(body["reconcile"]["outcome"], "granted");
    assert_eq!(body["reconcile"]["subscriber"], "user-1");
    assert_eq!(body["vip"]["vip"], true);

    let (_, body) = app
        .send_json(post_empty(&format!("/charges/{}/refresh", id)))
        .await;
    assert_eq!(body["reconcile"]["outcome"], "already_approved");
}

#[tokio::test]
async fn test_refresh_unknown_charge_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app.send_json(post_empty("/charges/missing/refresh")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_recovers_missed_approval() {
    let app = TestApp::new().await;
    let created = app
        .create_charge(json!({"user_id": "user-5", "email": "a@example.com", "amount": 10}))
        .await;
    let payment_id: i64 = created["payment_id"].as_str().unwrap().parse().unwrap();
    app.provider.set_status(payment_id, "approved");

    let (status, body) = app.send_json(post_empty("/vip/user-5/sync")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vip"], true);
    assert_eq!(
        app.charge(created["id"].as_str().unwrap()).status,
        ChargeStatus::Approved
    );

    let searches = app.provider.inner.lock().unwrap().searches.clone();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0]["external_reference"], "user-5");
    assert_eq!(searches[0]["sort"], "date_created");
    assert_eq!(searches[0]["criteria"], "desc");

    // A second sync finds the same approval and grants nothing more
    let expires = app.subscriber("user-5").unwrap().vip_expires_at;
    app.send_json(post_empty("/vip/user-5/sync")).await;
    assert_eq!(app.subscriber("user-5").unwrap().vip_expires_at, expires);
}

#[tokio::test]
async fn test_sync_ignores_payments_created_elsewhere() {
    let app = TestApp::new().await;
    app.provider.add_payment(9001, "approved", "user-6");

    let (status, body) = app.send_json(post_empty("/vip/user-6/sync")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["vip"], false);
    assert!(app.subscriber("user-6").is_none());
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;

    let (status, body) = app.send_json(get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
