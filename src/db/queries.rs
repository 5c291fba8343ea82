use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::vip::extend_expiry;

use super::from_row::{CHARGE_COLS, SUBSCRIBER_COLS, query_all, query_one};

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Charges ============

pub fn insert_charge(conn: &Connection, input: &CreateCharge, now: i64) -> Result<Charge> {
    let charge = input.clone().into_charge(gen_id(), now);

    conn.execute(
        &format!(
            "INSERT INTO charges ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            CHARGE_COLS
        ),
        params![
            &charge.id,
            &charge.provider_payment_id,
            &charge.subscriber,
            &charge.payer_email,
            charge.amount_cents,
            &charge.description,
            charge.status.as_ref(),
            &charge.provider_status,
            &charge.pix_code,
            &charge.qr_code_base64,
            &charge.ticket_url,
            charge.created_at,
            charge.updated_at,
            charge.approved_at,
            charge.expires_at,
        ],
    )?;

    Ok(charge)
}

pub fn get_charge(conn: &Connection, id: &str) -> Result<Option<Charge>> {
    query_one(
        conn,
        &format!("SELECT {} FROM charges WHERE id = ?1", CHARGE_COLS),
        params![id],
    )
}

pub fn get_charge_by_provider_id(conn: &Connection, provider_payment_id: &str) -> Result<Option<Charge>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM charges WHERE provider_payment_id = ?1",
            CHARGE_COLS
        ),
        params![provider_payment_id],
    )
}

/// Newest first.
pub fn list_charges_for_subscriber(conn: &Connection, subscriber: &str, limit: i64) -> Result<Vec<Charge>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM charges WHERE subscriber = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            CHARGE_COLS
        ),
        params![subscriber, limit],
    )
}

/// Record a non-approved provider status.
///
/// A `pending` report never overwrites an approval: notifications arrive in
/// no particular order. Returns whether a row changed.
pub fn record_provider_status(
    conn: &Connection,
    id: &str,
    provider_status: &str,
    status: ChargeStatus,
    now: i64,
) -> Result<bool> {
    if status == ChargeStatus::Approved {
        return Err(AppError::Internal(
            "approvals must go through claim_approval".into(),
        ));
    }

    let updated = conn.execute(
        "UPDATE charges SET status = ?1, provider_status = ?2, updated_at = ?3
         WHERE id = ?4 AND NOT (status = 'approved' AND ?1 = 'pending')",
        params![status.as_ref(), provider_status, now, id],
    )?;
    Ok(updated > 0)
}

/// Mark a charge approved for the first time. Returns true only for the call
/// that performed the transition, which makes it the once-only guard for
/// granting VIP time.
///
/// `approved_at` is never cleared, so a charge that was reversed and then
/// approved again cannot be claimed twice.
pub fn claim_approval(conn: &Connection, id: &str, provider_status: &str, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE charges SET status = 'approved', provider_status = ?1, approved_at = ?2, updated_at = ?2
         WHERE id = ?3 AND approved_at IS NULL",
        params![provider_status, now, id],
    )?;
    Ok(updated > 0)
}

/// Put an already-claimed charge back to approved after a reversal was
/// undone (e.g. a chargeback settled in the seller's favor). Grants nothing.
pub fn reinstate_approval(conn: &Connection, id: &str, provider_status: &str, now: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE charges SET status = 'approved', provider_status = ?1, updated_at = ?2
         WHERE id = ?3 AND approved_at IS NOT NULL AND status != 'approved'",
        params![provider_status, now, id],
    )?;
    Ok(updated > 0)
}

// ============ Subscribers ============

pub fn get_subscriber(conn: &Connection, id: &str) -> Result<Option<Subscriber>> {
    query_one(
        conn,
        &format!("SELECT {} FROM subscribers WHERE id = ?1", SUBSCRIBER_COLS),
        params![id],
    )
}

/// Add `days` of VIP time to a subscriber, creating the record if needed.
pub fn extend_vip(
    conn: &Connection,
    id: &str,
    email: Option<&str>,
    days: i64,
    now: i64,
) -> Result<Subscriber> {
    let current: Option<i64> = get_subscriber(conn, id)?.and_then(|s| s.vip_expires_at);
    let new_expiry = extend_expiry(current, now, days);

    conn.execute(
        "INSERT INTO subscribers (id, email, vip_expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
             email = COALESCE(excluded.email, subscribers.email),
             vip_expires_at = excluded.vip_expires_at,
             updated_at = excluded.updated_at",
        params![id, email, new_expiry, now],
    )?;

    get_subscriber(conn, id)?
        .ok_or_else(|| AppError::Internal("Subscriber missing after upsert".into()))
}

/// Approve a charge and extend its subscriber's VIP window atomically.
///
/// Returns `None` when the charge had been approved before (nothing extended).
pub fn approve_and_extend(
    conn: &Connection,
    charge: &Charge,
    provider_status: &str,
    days: i64,
    now: i64,
) -> Result<Option<Subscriber>> {
    let tx = conn.unchecked_transaction()?;

    if !claim_approval(&tx, &charge.id, provider_status, now)? {
        reinstate_approval(&tx, &charge.id, provider_status, now)?;
        tx.commit()?;
        return Ok(None);
    }
    let subscriber = extend_vip(&tx, &charge.subscriber, charge.payer_email.as_deref(), days, now)?;

    tx.commit()?;
    Ok(Some(subscriber))
}
