//! oneMail - session and realtime core for the unified email dashboard
//!
//! Keeps a dashboard user signed in against the oneMail API and streams
//! their mailbox events over a websocket.
//!
//! ## Module Organization
//!
//! - `api/`: Authenticated HTTP client with refresh-and-retry on `401`
//! - `realtime/`: Websocket connection manager with bounded reconnect
//! - `session/`: Sign-in state and live dashboard state
//! - `services/`: Account routes, session events, credential helpers
//! - `credentials/`: Session token storage
//! - `config/`: Configuration management
//! - `types/`: Data structures and types

pub mod api;
pub mod config;
pub mod credentials;
pub mod realtime;
pub mod services;
pub mod session;
pub mod types;

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use credentials::{FileTokenStore, TokenStorage};
use services::events::{EventEmitter, Notice, NoticeLevel, SessionEvent};
use session::SessionController;
use types::error::Result;

/// Headless session runner
///
/// Restores the stored session and logs realtime notices until Ctrl-C.
pub fn run() -> Result<()> {
    // In debug builds, default to debug level for our crate
    // Can be overridden with RUST_LOG environment variable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("onemail_lib=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    // Already installed when embedded in a host that set up tracing
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("Starting oneMail ...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    if let Err(e) = config::init_config() {
        warn!("Could not load config on startup: {}", e);
    }
    let config = config::get_config().unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config
    });

    let store_path = config.token_store_path();
    info!("Session store: {:?}", store_path);
    let tokens = TokenStorage::new(Arc::new(FileTokenStore::open(store_path)?));

    let (events, rx) = EventEmitter::channel();
    let listener = tokio::spawn(log_events(rx));

    let controller = SessionController::from_config(&config, tokens, events);
    match controller.restore().await {
        Some(user) => info!("Session restored for {}", user.phone_number),
        None => warn!("No usable stored session, sign in from the dashboard first"),
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    controller.realtime().disconnect();
    listener.abort();
    Ok(())
}

async fn log_events(rx: flume::Receiver<SessionEvent>) {
    while let Ok(event) = rx.recv_async().await {
        match event {
            SessionEvent::Notice(Notice {
                title,
                description,
                level: NoticeLevel::Info,
            }) => info!("{}: {}", title, description),
            SessionEvent::Notice(Notice {
                title,
                description,
                level: NoticeLevel::Destructive,
            }) => warn!("{}: {}", title, description),
            SessionEvent::LoginRequired => warn!("Session expired, sign in again"),
        }
    }
}
