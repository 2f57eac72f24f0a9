use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Chat-identity linking and delivery-mode control service for the
/// tournament tracker's companion bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address for the HTTP API (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory for persisted state files (overrides STATE_PATH)
    #[arg(long)]
    state_path: Option<String>,

    /// Skip applying the intended delivery mode on startup
    #[arg(long)]
    no_apply_mode: bool,
}

mod backend;
mod bot;
mod config;
mod error;
mod managers;
mod platform;
mod state;
mod web;

use backend::{LoggingBackend, MockTicketReader};
use bot::BotHandler;
use config::AppConfig;
use managers::{
    create_shared_binding_service, create_shared_code_manager, create_shared_delivery_controller,
};
use platform::{SharedPlatformApi, TelegramClient};
use state::{
    create_shared_account_directory, create_shared_code_store, AccountDirectory, ChatSessionStore,
    DeliveryStatusStore, PairingCodeStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(state_path) = args.state_path {
        config.state_path = state_path;
    }

    // Ensure state directory exists
    tokio::fs::create_dir_all(&config.state_path).await.ok();

    // Strict stores: a corrupt file here must stop the process rather than
    // silently void the linking invariants.
    info!("Loading account directory...");
    let accounts_path = format!("{}/accounts.json", config.state_path);
    let accounts = create_shared_account_directory(AccountDirectory::load(&accounts_path).await?);

    info!("Loading pairing codes...");
    let codes_path = format!("{}/pairing_codes.json", config.state_path);
    let codes = create_shared_code_store(PairingCodeStore::load(&codes_path).await?);

    // Degraded stores: these warn and start empty on failure.
    info!("Loading chat sessions...");
    let sessions = Arc::new(
        ChatSessionStore::load(&format!("{}/chat_sessions.json", config.state_path)).await,
    );

    let delivery_status = Arc::new(
        DeliveryStatusStore::load(&format!("{}/delivery_status.json", config.state_path)).await,
    );

    let platform: SharedPlatformApi = Arc::new(TelegramClient::new(&config.bot_token));

    let code_manager = create_shared_code_manager(codes, codes_path);
    let binding = create_shared_binding_service(code_manager, accounts, accounts_path);
    let delivery = create_shared_delivery_controller(
        config.delivery.clone(),
        platform.clone(),
        delivery_status,
    );

    let bot = Arc::new(BotHandler::new(
        binding.clone(),
        sessions.clone(),
        Arc::new(LoggingBackend),
        Arc::new(MockTicketReader),
    ));

    // Reconcile the delivery mode with the platform on startup. A failure
    // is recorded and logged; the operator retries via POST /bot/mode/apply.
    if args.no_apply_mode {
        info!("--no-apply-mode: Skipping startup delivery-mode reconciliation");
    } else {
        info!("Applying intended delivery mode: {}", config.delivery.mode);
        match delivery.apply_intended_mode().await {
            Ok(status) => info!(
                "Delivery mode active: {}",
                status
                    .mode
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unconfigured".to_string())
            ),
            Err(e) => error!(
                "Could not apply delivery mode: {} (retry with POST /bot/mode/apply)",
                e
            ),
        }
    }

    // Periodic session sweep; the endpoint remains available for manual runs.
    {
        let sessions = sessions.clone();
        let interval = Duration::from_secs(config.cleanup_interval_secs.max(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let removed = sessions.cleanup_expired().await;
                if removed > 0 {
                    info!("Periodic sweep removed {} expired session(s)", removed);
                }
            }
        });
    }

    let state = web::AppState {
        binding,
        sessions,
        delivery,
        platform,
        bot,
    };

    info!("Starting web server on {}", config.bind_addr);
    if let Err(e) = web::start_web_server(config.bind_addr, state).await {
        error!("Web server error: {}", e);
        return Err(e);
    }
    warn!("Server ended.");

    Ok(())
}
