//! # swapsyncd
//!
//! Background daemon for SwapSync: owns the database pool, drains the SMS
//! queue, and runs the scheduler until told to stop.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          swapsyncd                                      │
//! │                                                                         │
//! │  Database ──(notifier)──► DispatcherHandle ──► SMS workers ──► gateway │
//! │      │                                                                  │
//! │      └──► Scheduler: due repairs every tick, greetings once a day       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swapsync_core::pricing::SwapPolicy;
use swapsync_db::{Database, DbConfig};
use swapsync_notify::{Scheduler, SecretCipher, SmsConfigStore, SmsDispatcher, SmsGateway};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    let config = AppConfig::load().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }
    info!(
        db_url = %config.database_url,
        production = config.production,
        origins = ?config.allowed_origins,
        "Configuration loaded"
    );

    // Database
    let db_config = DbConfig::from_url(&config.database_url)
        .context("DATABASE_URL")?
        .max_connections(config.db_max_connections);
    let db = Database::new(db_config).await.context("Failed to open database")?;
    info!("Database ready");

    if let Some(admin) = &config.bootstrap_admin {
        let user = db
            .users()
            .bootstrap_super_admin(&admin.username, &admin.password, &admin.full_name)
            .await
            .context("Failed to bootstrap super admin")?;
        info!(id = user.id, username = %user.username, "Super admin ready");
    }

    // SMS pipeline
    let cipher = match &config.sms_encryption_key {
        Some(key) => Some(SecretCipher::new(key).context("SMS_ENCRYPTION_KEY")?),
        None => {
            warn!("SMS_ENCRYPTION_KEY not set; SMS credentials cannot be read and SMS stays off");
            None
        }
    };
    let store = Arc::new(SmsConfigStore::new(db.sms_config(), cipher));
    let gateway = Arc::new(
        SmsGateway::new(store, config.notify.provider_timeout).context("Failed to build SMS HTTP client")?,
    );

    let (dispatcher, handle) = SmsDispatcher::start(gateway.clone(), db.notifications(), &config.notify);
    let db = db
        .with_notifier(Arc::new(handle))
        .with_swap_policy(SwapPolicy {
            floor_percent: config.swap_value_floor_percent,
        });

    // Scheduler
    let (scheduler, scheduler_handle) = Scheduler::new(db.repairs(), db.users(), gateway, &config.notify);
    let scheduler_task = tokio::spawn(scheduler.run());

    info!("swapsyncd running");
    shutdown_signal().await;

    scheduler_handle.shutdown().await;
    if let Err(e) = scheduler_task.await {
        warn!(?e, "Scheduler task ended abnormally");
    }
    dispatcher.shutdown().await;
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
