//! SQLite storage on disk: schema creation, persistence across pools, and
//! backend selection.

use tempfile::TempDir;

mod common;
use common::*;

use pix_vip::db::{create_pool, open_store};

fn charge_input(payment_id: &str, subscriber: &str) -> CreateCharge {
    CreateCharge {
        provider_payment_id: payment_id.to_string(),
        subscriber: subscriber.to_string(),
        payer_email: None,
        amount_cents: 2500,
        description: "Compra de VIP".to_string(),
        status: ChargeStatus::Pending,
        provider_status: "pending".to_string(),
        pix_code: "000201".to_string(),
        qr_code_base64: String::new(),
        ticket_url: None,
        expires_at: None,
    }
}

#[test]
fn test_data_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pix_vip.db");
    let path = path.to_str().unwrap();

    let charge_id = {
        let pool = create_pool(path).unwrap();
        let conn = pool.get().unwrap();
        let charge = queries::insert_charge(&conn, &charge_input("1001", "user-1"), 1_700_000_000).unwrap();
        queries::approve_and_extend(&conn, &charge, "approved", 30, 1_700_000_100).unwrap();
        charge.id
    };

    // Schema creation is idempotent on an existing file
    let pool = create_pool(path).unwrap();
    let conn = pool.get().unwrap();
    let charge = queries::get_charge(&conn, &charge_id).unwrap().unwrap();
    assert_eq!(charge.status, ChargeStatus::Approved);
    assert_eq!(charge.approved_at, Some(1_700_000_100));

    let subscriber = queries::get_subscriber(&conn, "user-1").unwrap().unwrap();
    assert_eq!(subscriber.vip_expires_at, Some(1_700_000_100 + 30 * 86400));
}

#[test]
fn test_pool_connections_share_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.db");
    let pool = create_pool(path.to_str().unwrap()).unwrap();

    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    queries::insert_charge(&first, &charge_input("1", "user-1"), 1_700_000_000).unwrap();

    let seen = queries::get_charge_by_provider_id(&second, "1").unwrap();
    assert!(seen.is_some());
}

#[test]
fn test_duplicate_provider_payment_is_rejected() {
    let pool = create_test_pool();
    let conn = pool.get().unwrap();

    queries::insert_charge(&conn, &charge_input("1001", "user-1"), 1_700_000_000).unwrap();
    let err = queries::insert_charge(&conn, &charge_input("1001", "user-2"), 1_700_000_001);

    assert!(err.is_err());
}

#[tokio::test]
async fn test_open_store_defaults_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");

    let mut env = test_env("http://127.0.0.1:9");
    env.insert("DATABASE_PATH".into(), path.to_str().unwrap().to_string());
    let config = config_from(&env);

    let store = open_store(&config).unwrap();
    assert!(matches!(store, Store::Sqlite(_)));

    let charge = store
        .insert_charge(&charge_input("77", "user-3"), 1_700_000_000)
        .await
        .unwrap();
    let found = store.get_charge_by_provider_id("77").await.unwrap().unwrap();
    assert_eq!(found.id, charge.id);
    assert!(path.exists());
}
