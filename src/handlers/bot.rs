use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};

use crate::bot::{self, BotCommand};
use crate::db::AppState;
use crate::telegram::{SECRET_TOKEN_HEADER, Update};
use crate::util::header_str;

pub fn router() -> Router<AppState> {
    Router::new().route("/telegram/webhook", post(handle_telegram_webhook))
}

/// Telegram retries any non-2xx answer, so everything past authentication
/// is acknowledged with 200 and failures only show up in the logs.
pub async fn handle_telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(telegram) = &state.telegram else {
        return (StatusCode::NOT_FOUND, "Bot not configured");
    };

    if !telegram.verify_secret(header_str(&headers, SECRET_TOKEN_HEADER)) {
        return (StatusCode::UNAUTHORIZED, "Invalid secret token");
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!("Failed to parse Telegram update: {}", e);
            return (StatusCode::OK, "Update ignored");
        }
    };

    let Some(message) = update.message else {
        return (StatusCode::OK, "Update ignored");
    };
    let Some(text) = message.text.as_deref() else {
        return (StatusCode::OK, "Update ignored");
    };

    let chat_id = message.chat.id;
    let command = BotCommand::parse(text);
    tracing::debug!(chat_id, update_id = update.update_id, command = ?command, "Bot command received");

    let reply = bot::respond(&state, chat_id, command).await;
    if let Err(e) = telegram.send_message(chat_id, &reply).await {
        tracing::error!(chat_id, "Failed to send bot reply: {}", e);
    }

    (StatusCode::OK, "OK")
}
