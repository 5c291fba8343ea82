//! Telegram Bot API client for the messaging variant.
//!
//! Only the pieces the bot needs: parsing inbound updates and sending plain
//! text replies.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::TelegramConfig;
use crate::error::{AppError, Result};

/// Header Telegram sets on webhook calls when the webhook was registered with a secret.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    bot_token: String,
    webhook_secret: String,
    api_base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            bot_token: config.bot_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base_url: config.api_base_url.clone(),
        }
    }

    /// Constant-time check of the webhook secret token header.
    pub fn verify_secret(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) => token
                .as_bytes()
                .ct_eq(self.webhook_secret.as_bytes())
                .into(),
            None => false,
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendMessage",
                self.api_base_url, self.bot_token
            ))
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Telegram API error: {}", e)))?;

        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| {
            AppError::Provider(format!("Failed to parse Telegram response: {}", e))
        })?;

        if !status.is_success() || !body.ok {
            return Err(AppError::Provider(format!(
                "Telegram API error ({}): {}",
                status.as_u16(),
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }
}
