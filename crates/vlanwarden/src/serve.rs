//! Supervisor: wires the store, the RADIUS server, and the bot together
//! and owns their lifecycle.
//!
//! All workers share one shutdown signal. The first SIGINT/SIGTERM
//! triggers a graceful stop (the RADIUS server drains in-flight
//! handlers, the bot stops polling, the store gets a final save); a
//! second one exits immediately.

use crate::bot::{BotError, BotServer};
use crate::config::{Config, ConfigError};
use crate::registry::{Registry, StoreError, YamlStore};
use crate::server::{RadiusServer, ServerError};
use crate::shutdown::ShutdownToken;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Backlog of operator notifications awaiting the bot loop.
const ATTEMPT_QUEUE_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Bot(#[from] BotError),
}

/// Run the whole service until shutdown.
pub async fn serve(cfg: Config) -> Result<(), ServeError> {
    let database_file = cfg.absolute_database_file()?;
    let store = Arc::new(YamlStore::open(database_file)?);
    let registry: Arc<dyn Registry> = store.clone();

    let (attempts_tx, attempts_rx) = mpsc::channel(ATTEMPT_QUEUE_DEPTH);

    let server = RadiusServer::bind(
        &cfg.addr(),
        cfg.radius_secret.clone(),
        registry.clone(),
        attempts_tx,
        cfg.verbosity,
    )
    .await?;
    let bot = BotServer::new(&cfg, registry);

    let shutdown = Arc::new(ShutdownToken::new());
    spawn_signal_trap(shutdown.clone());

    info!("vlanwarden started, press Ctrl+C to stop");

    let result = tokio::try_join!(
        async { server.run(shutdown.subscribe()).await.map_err(ServeError::from) },
        async {
            bot.run(shutdown.subscribe(), attempts_rx)
                .await
                .map_err(ServeError::from)
        },
        async {
            store
                .watch_changes(shutdown.subscribe())
                .await
                .map_err(ServeError::from)
        },
    );

    // The registry is already persisted per mutation; this catches
    // anything a failed dump left behind.
    if let Err(e) = store.save() {
        warn!(error = %e, "final registry save failed");
    }

    match result {
        Ok(_) => {
            debug!("all workers stopped");
            Ok(())
        }
        Err(e) if shutdown.is_stopped() => {
            // Errors racing the stop signal are part of shutting down.
            debug!(error = %e, "worker error during shutdown");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// First signal stops gracefully; the second forces an exit.
fn spawn_signal_trap(shutdown: Arc<ShutdownToken>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

        let mut interrupts = 0u32;
        loop {
            #[cfg(unix)]
            {
                let term = async {
                    match terminate.as_mut() {
                        Some(stream) => {
                            stream.recv().await;
                        }
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term => {}
                }
            }
            #[cfg(not(unix))]
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }

            interrupts += 1;
            if interrupts > 1 {
                eprintln!("\nForce quit");
                std::process::exit(1);
            }

            eprintln!("\nGracefully shutting down. Press Ctrl+C again to force quit");
            shutdown.signal_stop();
        }
    });
}
