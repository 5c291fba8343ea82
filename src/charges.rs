//! PIX charge creation, shared by the HTTP API and the bot.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::models::{Charge, ChargeStatus, CreateCharge, cents_to_amount};
use crate::payments::{Payer, PixPaymentRequest};
use crate::reconcile;
use crate::util::now;

const MAX_DESCRIPTION_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct NewPixCharge {
    pub subscriber: String,
    pub payer_email: Option<String>,
    pub amount_cents: i64,
    pub description: Option<String>,
}

/// Create a PIX payment at the provider and persist it as a local charge.
pub async fn create_pix_charge(state: &AppState, input: NewPixCharge) -> Result<Charge> {
    if input.amount_cents <= 0 {
        return Err(AppError::BadRequest("Amount must be greater than zero".into()));
    }
    if input.amount_cents > state.vip.max_amount_cents {
        return Err(AppError::BadRequest(format!(
            "Amount exceeds the maximum of {} cents",
            state.vip.max_amount_cents
        )));
    }

    let payer_email = input
        .payer_email
        .clone()
        .or_else(|| state.vip.fallback_payer_email.clone())
        .ok_or_else(|| AppError::BadRequest("email is required to create a PIX charge".into()))?;

    let description = match input.description.as_deref().map(str::trim) {
        Some(d) if d.len() > MAX_DESCRIPTION_LEN => {
            return Err(AppError::BadRequest("Description is too long".into()));
        }
        Some(d) if !d.is_empty() => d.to_string(),
        _ => state.vip.charge_description.clone(),
    };

    let created_at = now();
    let expires_at = created_at + state.vip.pix_expiration_minutes * 60;
    let date_of_expiration = DateTime::<Utc>::from_timestamp(expires_at, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true));

    let payment = state
        .mercadopago
        .create_pix_payment(&PixPaymentRequest {
            transaction_amount: cents_to_amount(input.amount_cents),
            description: &description,
            payment_method_id: "pix",
            payer: Payer {
                email: &payer_email,
            },
            external_reference: &input.subscriber,
            notification_url: state.notification_url.as_deref(),
            date_of_expiration,
        })
        .await?;

    let provider_status = ChargeStatus::from_provider(&payment.status);

    // Approvals are only ever applied through reconciliation, which owns the VIP grant
    let initial_status = match provider_status {
        ChargeStatus::Approved => ChargeStatus::Pending,
        other => other,
    };

    let charge = state
        .store
        .insert_charge(
            &CreateCharge {
                provider_payment_id: payment.id.to_string(),
                subscriber: input.subscriber.clone(),
                payer_email: Some(payer_email),
                amount_cents: input.amount_cents,
                description,
                status: initial_status,
                provider_status: payment.status.clone(),
                pix_code: payment.pix_code(),
                qr_code_base64: payment.qr_code_base64(),
                ticket_url: payment.ticket_url(),
                expires_at: Some(expires_at),
            },
            created_at,
        )
        .await?;

    tracing::info!(
        charge_id = %charge.id,
        payment_id = %charge.provider_payment_id,
        subscriber = %charge.subscriber,
        amount_cents = charge.amount_cents,
        "PIX charge created"
    );

    if provider_status == ChargeStatus::Approved {
        reconcile::apply_payment(state, &payment).await?;
        return state
            .store
            .get_charge(&charge.id)
            .await?
            .ok_or_else(|| AppError::Internal("Charge missing after approval".into()));
    }

    Ok(charge)
}
