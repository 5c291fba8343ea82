use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MercadoPagoConfig;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
pub struct PixPaymentRequest<'a> {
    pub transaction_amount: f64,
    pub description: &'a str,
    pub payment_method_id: &'static str,
    pub payer: Payer<'a>,
    pub external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_expiration: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Payer<'a> {
    pub email: &'a str,
}

/// A payment as reported by Mercado Pago. Only the fields this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub date_approved: Option<String>,
    #[serde(default)]
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointOfInteraction {
    #[serde(default)]
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionData {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_base64: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

impl ProviderPayment {
    fn transaction_data(&self) -> Option<&TransactionData> {
        self.point_of_interaction
            .as_ref()
            .and_then(|poi| poi.transaction_data.as_ref())
    }

    /// PIX copy-paste code ("copia e cola"); empty when the provider sent none.
    pub fn pix_code(&self) -> String {
        self.transaction_data()
            .and_then(|t| t.qr_code.clone())
            .unwrap_or_default()
    }

    pub fn qr_code_base64(&self) -> String {
        self.transaction_data()
            .and_then(|t| t.qr_code_base64.clone())
            .unwrap_or_default()
    }

    pub fn ticket_url(&self) -> Option<String> {
        self.transaction_data().and_then(|t| t.ticket_url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ProviderPayment>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            access_token: config.access_token.clone(),
            base_url: config.api_base_url.clone(),
        }
    }

    /// Create a PIX payment.
    ///
    /// Mercado Pago requires an `X-Idempotency-Key` on creation. The key is
    /// generated per call, so every call creates a new payment; it does not
    /// deduplicate a client that retries `POST /pix`.
    pub async fn create_pix_payment(
        &self,
        request: &PixPaymentRequest<'_>,
    ) -> Result<ProviderPayment> {
        let idempotency_key = uuid::Uuid::new_v4().to_string();

        let response = self
            .client
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Mercado Pago API error: {}", e)))?;

        Self::parse(response).await
    }

    pub async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payments/{}",
                self.base_url,
                urlencoding::encode(payment_id)
            ))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Mercado Pago API error: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Payment {} not found at provider",
                payment_id
            )));
        }

        Self::parse(response).await
    }

    /// Most recent payments carrying `external_reference`, newest first.
    pub async fn search_payments(
        &self,
        external_reference: &str,
        limit: u32,
    ) -> Result<Vec<ProviderPayment>> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/v1/payments/search", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[
                ("sort", "date_created"),
                ("criteria", "desc"),
                ("external_reference", external_reference),
                ("limit", limit.as_str()),
                ("offset", "0"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Mercado Pago API error: {}", e)))?;

        let search: SearchResponse = Self::parse(response).await?;
        Ok(search.results)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(text);
            return Err(AppError::Provider(format!(
                "Mercado Pago API error ({}): {}",
                status.as_u16(),
                message
            )));
        }

        response.json().await.map_err(|e| {
            AppError::Provider(format!("Failed to parse Mercado Pago response: {}", e))
        })
    }
}

/// Verify a Mercado Pago webhook signature.
///
/// `x-signature` looks like `ts=1704908010,v1=<hex>`. The signed manifest is
/// `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`, with the parts whose
/// value is absent left out and the id lowercased.
pub fn verify_webhook_signature(
    secret: &str,
    signature_header: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> bool {
    let mut ts = None;
    let mut v1 = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }
    let (Some(ts), Some(v1)) = (ts, v1) else {
        return false;
    };

    let expected = match signature_for(secret, ts, request_id, data_id) {
        Some(sig) => sig,
        None => return false,
    };

    expected
        .as_bytes()
        .ct_eq(v1.to_ascii_lowercase().as_bytes())
        .into()
}

/// Hex HMAC-SHA256 of the webhook manifest.
pub fn signature_for(
    secret: &str,
    ts: &str,
    request_id: Option<&str>,
    data_id: Option<&str>,
) -> Option<String> {
    let mut manifest = String::new();
    if let Some(id) = data_id {
        manifest.push_str(&format!("id:{};", id.to_lowercase()));
    }
    if let Some(request_id) = request_id {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(manifest.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Query string of a notification. Webhooks send `data.id` and `type`; the
/// legacy IPN sends `topic` and `id`.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub topic: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationBody {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationData {
    /// Sent as a string by webhooks and as a number by some older senders
    pub id: serde_json::Value,
}

/// What a notification is about, after merging query string and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic: String,
    pub resource_id: Option<String>,
}

impl Notification {
    pub fn resolve(query: &NotificationQuery, body: &NotificationBody) -> Self {
        let topic = query
            .event_type
            .clone()
            .or_else(|| query.topic.clone())
            .or_else(|| body.event_type.clone())
            .or_else(|| {
                body.action
                    .as_deref()
                    .and_then(|a| a.split('.').next())
                    .map(String::from)
            })
            .unwrap_or_default();

        let body_id = body.data.as_ref().and_then(|d| match &d.id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let resource_id = query
            .data_id
            .clone()
            .or(body_id)
            .or_else(|| query.id.clone())
            .filter(|id| !id.trim().is_empty());

        Self { topic, resource_id }
    }

    pub fn is_payment(&self) -> bool {
        self.topic == "payment"
    }
}
