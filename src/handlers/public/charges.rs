use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::charges::{self, NewPixCharge};
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::{AmountInput, Charge, ChargeStatus, cents_to_amount, normalize_email, subscriber_key};
use crate::reconcile::{self, ReconcileOutcome};
use crate::vip::VipStatus;

/// Charge request. Field aliases keep the older clients (`userId`, `valor`) working.
#[derive(Debug, Deserialize)]
pub struct CreatePixRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "valor")]
    pub amount: Option<AmountInput>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    /// Local charge id
    pub id: String,
    /// Provider payment id
    pub payment_id: String,
    pub status: ChargeStatus,
    pub subscriber: String,
    pub amount: f64,
    pub amount_cents: i64,
    pub description: String,
    pub pix_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub approved_at: Option<i64>,
}

impl From<Charge> for ChargeResponse {
    fn from(charge: Charge) -> Self {
        Self {
            id: charge.id,
            payment_id: charge.provider_payment_id,
            status: charge.status,
            subscriber: charge.subscriber,
            amount: cents_to_amount(charge.amount_cents),
            amount_cents: charge.amount_cents,
            description: charge.description,
            pix_code: charge.pix_code,
            qr_code_base64: charge.qr_code_base64,
            ticket_url: charge.ticket_url,
            created_at: charge.created_at,
            expires_at: charge.expires_at,
            approved_at: charge.approved_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub charge: ChargeResponse,
    pub reconcile: ReconcileOutcome,
    pub vip: VipStatus,
}

pub async fn create_pix(
    State(state): State<AppState>,
    Json(request): Json<CreatePixRequest>,
) -> Result<Json<ChargeResponse>> {
    let subscriber = subscriber_key(request.user_id.as_deref(), request.email.as_deref())
        .ok_or_else(|| AppError::BadRequest("user_id or email is required".into()))?;

    let amount_cents = request
        .amount
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("amount is required".into()))?
        .to_cents()?;

    let payer_email = request
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());

    let charge = charges::create_pix_charge(
        &state,
        NewPixCharge {
            subscriber,
            payer_email,
            amount_cents,
            description: request.description,
        },
    )
    .await?;

    Ok(Json(charge.into()))
}

pub async fn get_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChargeResponse>> {
    let charge = state
        .store
        .get_charge(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Charge not found".into()))?;

    Ok(Json(charge.into()))
}

/// Poll the provider for a charge and reconcile, for when the webhook never came.
pub async fn refresh_charge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>> {
    let (charge, outcome) = reconcile::refresh_charge(&state, &id).await?;
    let vip = reconcile::vip_status(&state, &charge.subscriber).await?;

    Ok(Json(RefreshResponse {
        charge: charge.into(),
        reconcile: outcome,
        vip,
    }))
}
