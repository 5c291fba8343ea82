//! Reconciliation of provider payments with local charges.
//!
//! The provider is the source of truth for a payment's status, but a
//! notification body is not: callers always pass a payment freshly fetched
//! from the provider API.

use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::{Charge, ChargeStatus, telegram_chat_id};
use crate::payments::ProviderPayment;
use crate::util::{format_timestamp, now};
use crate::vip::VipStatus;

/// How many provider payments a subscriber sync looks at.
const SYNC_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The payment does not belong to a charge created here
    Ignored,
    /// Status recorded (pending or rejected)
    Updated { status: ChargeStatus },
    /// Stale pending report for an already-approved charge
    Unchanged,
    /// First approval of the charge; VIP window extended
    Granted {
        subscriber: String,
        vip_expires_at: i64,
    },
    /// Approval already processed earlier; no second extension
    AlreadyApproved,
}

/// Apply a provider payment to the matching local charge.
pub async fn apply_payment(state: &AppState, payment: &ProviderPayment) -> Result<ReconcileOutcome> {
    let payment_id = payment.id.to_string();

    let Some(charge) = state.store.get_charge_by_provider_id(&payment_id).await? else {
        tracing::warn!(payment_id = %payment_id, "Payment does not match any local charge");
        return Ok(ReconcileOutcome::Ignored);
    };

    if let Some(reference) = payment.external_reference.as_deref() {
        if reference != charge.subscriber {
            tracing::warn!(
                charge_id = %charge.id,
                payment_id = %payment_id,
                external_reference = %reference,
                subscriber = %charge.subscriber,
                "Provider external_reference differs from the stored subscriber"
            );
        }
    }

    let now = now();
    let status = ChargeStatus::from_provider(&payment.status);

    let outcome = match status {
        ChargeStatus::Approved => {
            match state
                .store
                .approve_and_extend(&charge, &payment.status, state.vip.days, now)
                .await?
            {
                Some(subscriber) => {
                    let vip_expires_at = subscriber.vip_expires_at.ok_or_else(|| {
                        AppError::Internal("VIP grant left no expiry".into())
                    })?;
                    tracing::info!(
                        charge_id = %charge.id,
                        payment_id = %payment_id,
                        subscriber = %subscriber.id,
                        vip_expires_at,
                        "Payment approved, VIP granted"
                    );
                    notify_granted(state, &charge, vip_expires_at).await;
                    ReconcileOutcome::Granted {
                        subscriber: subscriber.id,
                        vip_expires_at,
                    }
                }
                None => {
                    tracing::debug!(charge_id = %charge.id, "Approval already processed");
                    ReconcileOutcome::AlreadyApproved
                }
            }
        }
        _ => {
            if charge.status == ChargeStatus::Approved && status == ChargeStatus::Rejected {
                // No revocation: the window granted by the approval runs out on its own
                tracing::warn!(
                    charge_id = %charge.id,
                    payment_id = %payment_id,
                    provider_status = %payment.status,
                    "Approved charge reversed at provider"
                );
            }

            let changed = state
                .store
                .record_provider_status(&charge.id, &payment.status, status, now)
                .await?;
            if changed {
                tracing::info!(
                    charge_id = %charge.id,
                    payment_id = %payment_id,
                    status = status.as_ref(),
                    "Charge status updated"
                );
                ReconcileOutcome::Updated { status }
            } else {
                ReconcileOutcome::Unchanged
            }
        }
    };

    Ok(outcome)
}

/// Poll the provider for a charge's payment and reconcile it.
pub async fn refresh_charge(state: &AppState, charge_id: &str) -> Result<(Charge, ReconcileOutcome)> {
    let charge = state
        .store
        .get_charge(charge_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Charge not found".into()))?;

    let payment = state
        .mercadopago
        .get_payment(&charge.provider_payment_id)
        .await?;
    let outcome = apply_payment(state, &payment).await?;

    let charge = state
        .store
        .get_charge(charge_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Charge not found".into()))?;

    Ok((charge, outcome))
}

/// Look up the subscriber's recent payments at the provider and reconcile
/// each one, for when notifications were lost.
pub async fn sync_subscriber(state: &AppState, subscriber: &str) -> Result<Vec<ReconcileOutcome>> {
    let payments = state
        .mercadopago
        .search_payments(subscriber, SYNC_SEARCH_LIMIT)
        .await?;

    let mut outcomes = Vec::with_capacity(payments.len());
    for payment in &payments {
        outcomes.push(apply_payment(state, payment).await?);
    }

    tracing::info!(
        subscriber = %subscriber,
        payments = payments.len(),
        "Subscriber synced with provider"
    );

    Ok(outcomes)
}

pub async fn vip_status(state: &AppState, subscriber: &str) -> Result<VipStatus> {
    let record = state.store.get_subscriber(subscriber).await?;
    Ok(VipStatus::evaluate(subscriber, record.as_ref(), now()))
}

/// Tell a bot subscriber their VIP is active. Delivery failures are logged only.
async fn notify_granted(state: &AppState, charge: &Charge, vip_expires_at: i64) {
    let (Some(bot), Some(chat_id)) = (&state.telegram, telegram_chat_id(&charge.subscriber)) else {
        return;
    };

    let text = format!(
        "✅ Pagamento confirmado! Seu VIP está ativo até {}.",
        format_timestamp(vip_expires_at)
    );
    if let Err(e) = bot.send_message(chat_id, &text).await {
        tracing::warn!(chat_id, "Failed to send VIP confirmation: {}", e);
    }
}
