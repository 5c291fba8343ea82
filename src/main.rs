use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pix_vip::config::Config;
use pix_vip::db::{self, AppState};
use pix_vip::commands;
use pix_vip::handlers;

#[derive(Parser)]
#[command(name = "pix-vip", version, about = "PIX charges with VIP entitlements")]
struct Cli {
    /// Override HOST
    #[arg(long, global = true)]
    host: Option<String>,
    /// Override PORT
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Override DATABASE_PATH (SQLite backend only)
    #[arg(long, global = true)]
    database: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a subscriber's VIP status
    Vip { subscriber: String },
    /// Poll the provider for a charge and reconcile it
    Refresh { charge_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pix_vip=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    config.validate().context("Invalid configuration")?;

    if config.dev_mode && config.mercadopago.webhook_secret.is_none() {
        tracing::warn!("MP_WEBHOOK_SECRET not set: webhook signatures are NOT verified (dev mode)");
    }

    let store = db::open_store(&config).context("Failed to open storage")?;
    let state = AppState::new(&config, store);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, state).await,
        Command::Vip { subscriber } => {
            println!("{}", commands::vip(&state, &subscriber).await?);
            Ok(())
        }
        Command::Refresh { charge_id } => {
            println!("{}", commands::refresh(&state, &charge_id).await?);
            Ok(())
        }
    }
}

async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let bot_enabled = state.telegram.is_some();
    let app = handlers::app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on {}", addr);
    match config.notification_url() {
        Some(url) => tracing::info!("Provider notifications: {}", url),
        None => tracing::warn!("PUBLIC_BASE_URL not set; charges are created without notification_url"),
    }
    if bot_enabled {
        tracing::info!("Telegram bot webhook enabled at /telegram/webhook");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
