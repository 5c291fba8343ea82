use std::env;

const DEFAULT_MP_API_BASE_URL: &str = "https://api.mercadopago.com";
const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} has an invalid value: {1}")]
    Invalid(&'static str, String),
    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public URL of this service; used to build the provider notification URL
    pub public_base_url: Option<String>,
    pub dev_mode: bool,
    pub rate_limit_per_minute: u32,
    pub mercadopago: MercadoPagoConfig,
    pub vip: VipSettings,
    /// When set, charges and subscribers live in Supabase instead of SQLite
    pub supabase: Option<SupabaseConfig>,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub webhook_secret: Option<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct VipSettings {
    /// Days of VIP granted per approved charge
    pub days: i64,
    pub charge_description: String,
    pub pix_expiration_minutes: i64,
    pub max_amount_cents: i64,
    /// Payer email sent to the provider when the client only gave a user id
    pub fallback_payer_email: Option<String>,
}

impl Default for VipSettings {
    fn default() -> Self {
        Self {
            days: 30,
            charge_description: "Compra de VIP".to_string(),
            pix_expiration_minutes: 30,
            max_amount_cents: 100_000_000,
            fallback_payer_email: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub charges_table: String,
    pub subscribers_table: String,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub webhook_secret: String,
    pub api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dev_mode = get("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("PORT", get("PORT"), 3000u16)?;

        let defaults = VipSettings::default();
        let vip = VipSettings {
            days: parse_or("VIP_DAYS", get("VIP_DAYS"), defaults.days)?,
            charge_description: get("CHARGE_DESCRIPTION").unwrap_or(defaults.charge_description),
            pix_expiration_minutes: parse_or(
                "PIX_EXPIRATION_MINUTES",
                get("PIX_EXPIRATION_MINUTES"),
                defaults.pix_expiration_minutes,
            )?,
            max_amount_cents: parse_or(
                "MAX_AMOUNT_CENTS",
                get("MAX_AMOUNT_CENTS"),
                defaults.max_amount_cents,
            )?,
            fallback_payer_email: get("FALLBACK_PAYER_EMAIL"),
        };

        let mercadopago = MercadoPagoConfig {
            access_token: get("MP_ACCESS_TOKEN").ok_or(ConfigError::Missing("MP_ACCESS_TOKEN"))?,
            webhook_secret: get("MP_WEBHOOK_SECRET"),
            api_base_url: trim_base(
                get("MP_API_BASE_URL").unwrap_or_else(|| DEFAULT_MP_API_BASE_URL.to_string()),
            ),
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_SERVICE_KEY")) {
            (Some(url), Some(service_key)) => Some(SupabaseConfig {
                url: trim_base(url),
                service_key,
                charges_table: get("SUPABASE_CHARGES_TABLE").unwrap_or_else(|| "charges".into()),
                subscribers_table: get("SUPABASE_SUBSCRIBERS_TABLE")
                    .unwrap_or_else(|| "subscribers".into()),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Inconsistent(
                    "SUPABASE_URL and SUPABASE_SERVICE_KEY must be set together".into(),
                ));
            }
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_WEBHOOK_SECRET")) {
            (Some(bot_token), Some(webhook_secret)) => Some(TelegramConfig {
                bot_token,
                webhook_secret,
                api_base_url: trim_base(
                    get("TELEGRAM_API_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE_URL.to_string()),
                ),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Inconsistent(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_WEBHOOK_SECRET must be set together".into(),
                ));
            }
        };

        Ok(Self {
            host,
            port,
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "pix_vip.db".to_string()),
            public_base_url: get("PUBLIC_BASE_URL").map(trim_base),
            dev_mode,
            rate_limit_per_minute: parse_or(
                "RATE_LIMIT_PER_MINUTE",
                get("RATE_LIMIT_PER_MINUTE"),
                60u32,
            )?,
            mercadopago,
            vip,
            supabase,
            telegram,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vip.days <= 0 {
            return Err(ConfigError::Invalid("VIP_DAYS", self.vip.days.to_string()));
        }
        if self.vip.pix_expiration_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "PIX_EXPIRATION_MINUTES",
                self.vip.pix_expiration_minutes.to_string(),
            ));
        }
        if self.vip.max_amount_cents <= 0 {
            return Err(ConfigError::Invalid(
                "MAX_AMOUNT_CENTS",
                self.vip.max_amount_cents.to_string(),
            ));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid("RATE_LIMIT_PER_MINUTE", "0".into()));
        }
        // Unsigned webhooks are only tolerated while developing against the sandbox
        if self.mercadopago.webhook_secret.is_none() && !self.dev_mode {
            return Err(ConfigError::Missing("MP_WEBHOOK_SECRET"));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL the provider should POST payment notifications to.
    pub fn notification_url(&self) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/webhook/mercadopago", base))
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, v.clone())),
        None => Ok(default),
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
