use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChargeStatus {
    /// Map a Mercado Pago payment status onto the local three-value status.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" => ChargeStatus::Approved,
            "rejected" | "cancelled" | "refunded" | "charged_back" => ChargeStatus::Rejected,
            // pending, in_process, authorized, in_mediation and anything new
            _ => ChargeStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub provider_payment_id: String,
    pub subscriber: String,
    pub payer_email: Option<String>,
    pub amount_cents: i64,
    pub description: String,
    pub status: ChargeStatus,
    pub provider_status: String,
    pub pix_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub approved_at: Option<i64>,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CreateCharge {
    pub provider_payment_id: String,
    pub subscriber: String,
    pub payer_email: Option<String>,
    pub amount_cents: i64,
    pub description: String,
    pub status: ChargeStatus,
    pub provider_status: String,
    pub pix_code: String,
    pub qr_code_base64: String,
    pub ticket_url: Option<String>,
    pub expires_at: Option<i64>,
}

impl CreateCharge {
    pub fn into_charge(self, id: String, now: i64) -> Charge {
        Charge {
            id,
            provider_payment_id: self.provider_payment_id,
            subscriber: self.subscriber,
            payer_email: self.payer_email,
            amount_cents: self.amount_cents,
            description: self.description,
            approved_at: (self.status == ChargeStatus::Approved).then_some(now),
            status: self.status,
            provider_status: self.provider_status,
            pix_code: self.pix_code,
            qr_code_base64: self.qr_code_base64,
            ticket_url: self.ticket_url,
            created_at: now,
            updated_at: now,
            expires_at: self.expires_at,
        }
    }
}

/// Amount as sent by clients: the drafts posted both `10.5` and `"10.50"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    /// Convert a reais amount into cents, rejecting anything that is not a
    /// positive value with at most two decimal places.
    pub fn to_cents(&self) -> Result<i64> {
        let value = match self {
            AmountInput::Number(n) => *n,
            AmountInput::Text(s) => s
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| AppError::BadRequest(format!("Invalid amount: {}", s)))?,
        };

        if !value.is_finite() || value <= 0.0 {
            return Err(AppError::BadRequest("Amount must be greater than zero".into()));
        }

        let cents = value * 100.0;
        let rounded = cents.round();
        if (cents - rounded).abs() > 1e-6 {
            return Err(AppError::BadRequest(
                "Amount must have at most two decimal places".into(),
            ));
        }
        if rounded > i64::MAX as f64 {
            return Err(AppError::BadRequest("Amount is too large".into()));
        }

        Ok(rounded as i64)
    }
}

/// Format cents as a decimal reais value for the provider API.
pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}
