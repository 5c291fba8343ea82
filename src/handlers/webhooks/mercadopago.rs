use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::extractors::Query;
use crate::payments::{Notification, NotificationBody, NotificationQuery, verify_webhook_signature};
use crate::reconcile;
use crate::util::header_str;

pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // IPN notifications arrive with an empty body
    let notification_body: NotificationBody = if body.is_empty() {
        NotificationBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Failed to parse Mercado Pago notification: {}", e);
                return (StatusCode::BAD_REQUEST, "Invalid JSON");
            }
        }
    };

    let notification = Notification::resolve(&query, &notification_body);

    // Verify webhook signature
    if let Some(secret) = &state.webhook_secret {
        let signature = match header_str(&headers, "x-signature") {
            Some(sig) => sig,
            None => return (StatusCode::UNAUTHORIZED, "Missing x-signature header"),
        };
        let data_id = query
            .data_id
            .as_deref()
            .or(notification.resource_id.as_deref());

        if !verify_webhook_signature(secret, signature, header_str(&headers, "x-request-id"), data_id) {
            tracing::warn!(data_id = ?data_id, "Rejected Mercado Pago notification with invalid signature");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    if !notification.is_payment() {
        return (StatusCode::OK, "Event ignored");
    }

    let payment_id = match &notification.resource_id {
        Some(id) => id,
        None => return (StatusCode::BAD_REQUEST, "Missing payment id"),
    };

    // Never trust the notification body for status: ask the provider
    let payment = match state.mercadopago.get_payment(payment_id).await {
        Ok(p) => p,
        Err(AppError::NotFound(_)) => {
            tracing::warn!(payment_id = %payment_id, "Notified payment not found at provider");
            return (StatusCode::OK, "Payment not found");
        }
        Err(e) => {
            tracing::error!(payment_id = %payment_id, "Failed to fetch payment: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch payment");
        }
    };

    match reconcile::apply_payment(&state, &payment).await {
        Ok(outcome) => {
            tracing::info!(payment_id = %payment_id, outcome = ?outcome, "Mercado Pago notification processed");
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            tracing::error!(payment_id = %payment_id, "Reconciliation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation failed")
        }
    }
}
