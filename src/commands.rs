//! One-shot operator commands run from the CLI against the configured store.

use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::{ChargeStatus, parse_subscriber_key};
use crate::reconcile::{self, ReconcileOutcome};

#[derive(Debug, Serialize)]
pub struct RefreshReport {
    pub charge_id: String,
    pub status: ChargeStatus,
    pub provider_status: String,
    pub reconcile: ReconcileOutcome,
}

/// VIP status of a subscriber (user id or email) as pretty JSON.
pub async fn vip(state: &AppState, subscriber: &str) -> Result<String> {
    let key = parse_subscriber_key(subscriber)
        .ok_or_else(|| AppError::BadRequest("subscriber is required".into()))?;
    let status = reconcile::vip_status(state, &key).await?;
    Ok(serde_json::to_string_pretty(&status)?)
}

/// Poll the provider for a charge, reconcile it, and report the result.
pub async fn refresh(state: &AppState, charge_id: &str) -> Result<String> {
    let (charge, outcome) = reconcile::refresh_charge(state, charge_id).await?;
    let report = RefreshReport {
        charge_id: charge.id,
        status: charge.status,
        provider_status: charge.provider_status,
        reconcile: outcome,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
