mod from_row;
pub mod queries;
mod store;
pub mod supabase;

pub use store::Store;
pub use supabase::SupabaseClient;

use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::num::NonZeroU32;

use crate::config::{Config, VipSettings};
use crate::error::Result;
use crate::payments::MercadoPagoClient;
use crate::telegram::TelegramClient;

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub mercadopago: MercadoPagoClient,
    /// Present only when the Telegram bot is configured
    pub telegram: Option<TelegramClient>,
    pub vip: VipSettings,
    /// `None` disables signature checks (dev mode only)
    pub webhook_secret: Option<String>,
    pub notification_url: Option<String>,
    pub rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn new(config: &Config, store: Store) -> Self {
        Self {
            store,
            mercadopago: MercadoPagoClient::new(&config.mercadopago),
            telegram: config.telegram.as_ref().map(TelegramClient::new),
            vip: config.vip.clone(),
            webhook_secret: config.mercadopago.webhook_secret.clone(),
            notification_url: config.notification_url(),
            rate_limiter: rate_limiter(config.rate_limit_per_minute),
        }
    }
}

/// Unkeyed limiter shared by the charge-creation routes.
pub fn rate_limiter(per_minute: u32) -> Arc<DefaultDirectRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Open the SQLite pool at `path` and make sure the schema exists.
pub fn create_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path)
        .with_init(|c| c.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder().max_size(8).build(manager)?;
    let conn = pool.get()?;
    init_db(&conn)?;
    Ok(pool)
}

/// Pick the storage backend: Supabase when configured, SQLite otherwise.
pub fn open_store(config: &Config) -> Result<Store> {
    match &config.supabase {
        Some(supabase) => {
            tracing::info!("Using Supabase storage at {}", supabase.url);
            Ok(Store::Supabase(SupabaseClient::new(supabase)))
        }
        None => {
            tracing::info!("Using SQLite storage at {}", config.database_path);
            Ok(Store::Sqlite(create_pool(&config.database_path)?))
        }
    }
}
