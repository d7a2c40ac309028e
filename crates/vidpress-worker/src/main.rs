//! Compression worker binary.

use tracing::{error, info};

use vidpress_queue::Broker;
use vidpress_webhook::WebhookDispatcher;
use vidpress_worker::{logging, WorkerConfig, WorkerSupervisor};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init("vidpress=info");

    info!("Starting vidpress-worker");

    let config = WorkerConfig::from_env();
    info!(?config, "Worker config");

    let broker = match Broker::from_env() {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create broker client: {}", e);
            std::process::exit(1);
        }
    };

    let dispatcher = match WebhookDispatcher::from_env() {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create webhook dispatcher: {}", e);
            std::process::exit(1);
        }
    };

    let supervisor = match WorkerSupervisor::boot(config, broker, dispatcher).await {
        Ok(s) => s,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let supervisor = std::sync::Arc::new(supervisor);

    // INT/TERM quiesce the claim loop and let in-flight jobs finish.
    {
        let supervisor = std::sync::Arc::clone(&supervisor);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Received shutdown signal");
            supervisor.shutdown();
        });
    }

    if let Err(e) = supervisor.run().await {
        error!("Supervisor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
