use serde::{Deserialize, Serialize};

/// Prefix for subscribers created through the Telegram bot.
pub const TELEGRAM_SUBSCRIBER_PREFIX: &str = "telegram:";

/// VIP entitlement record, keyed by subscriber key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub email: Option<String>,
    pub vip_expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Build the key an entitlement is stored under.
///
/// A user id wins over an email; emails are normalized so lookups by
/// `Foo@Example.com` and `foo@example.com` hit the same record.
pub fn subscriber_key(user_id: Option<&str>, email: Option<&str>) -> Option<String> {
    if let Some(id) = user_id.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(id.to_string());
    }
    email
        .map(normalize_email)
        .filter(|s| !s.is_empty())
}

/// Key from a single free-form value: anything with an `@` is an email.
pub fn parse_subscriber_key(raw: &str) -> Option<String> {
    if raw.contains('@') {
        subscriber_key(None, Some(raw))
    } else {
        subscriber_key(Some(raw), None)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Subscriber key for a Telegram chat.
pub fn telegram_subscriber(chat_id: i64) -> String {
    format!("{}{}", TELEGRAM_SUBSCRIBER_PREFIX, chat_id)
}

/// Chat id of a bot-originated subscriber, if the key is one.
pub fn telegram_chat_id(subscriber: &str) -> Option<i64> {
    subscriber
        .strip_prefix(TELEGRAM_SUBSCRIBER_PREFIX)
        .and_then(|id| id.parse().ok())
}
