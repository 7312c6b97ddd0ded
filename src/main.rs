use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod db;
mod http;
mod machine;
mod models;
mod services;
mod state;
mod utils;

use api::Sinks;
use config::Config;
use state::AppState;

const DEFAULT_LOG_FILTER: &str = "booking_swap=debug,tower_http=info,sqlx=warn";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting booking-swap v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    // Initialize database
    info!("Initializing database...");
    let pool = match db::init_db(&config).await {
        Ok(p) => {
            info!("Database initialized successfully");
            p
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let sinks = Sinks::from_config(&config);
    for (name, url) in [
        ("Notification", &config.notification_service_url),
        ("Notary", &config.notary_service_url),
        ("Payment", &config.payment_service_url),
    ] {
        match url {
            Some(url) => info!("{} service: {}", name, url),
            None => warn!("{} service not configured", name),
        }
    }

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, sinks, config);
    services::sweep_service::spawn(state.clone());

    let listener = match TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            return;
        }
    };
    info!("Listening on {}", bind_address);

    if let Err(e) = axum::serve(listener, http::create(state)).await {
        error!("Server error: {}", e);
    }
}
