//! Intake API binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vidpress_api::{create_router, ApiConfig, AppState};
use vidpress_queue::Broker;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vidpress=info,tower_http=warn"));
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let _log_guard = init_logging(env_filter, use_json);

    info!("Starting vidpress-api");

    let config = ApiConfig::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    let broker = match Broker::from_env() {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create broker client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(config, broker);
    let router = create_router(state)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("API shutdown complete");
}

fn init_logging(
    env_filter: EnvFilter,
    use_json: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_writer, guard) = match std::env::var("LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    let (writer, guard) = tracing_appender::non_blocking(file);
                    (Some(writer), Some(guard))
                }
                Err(e) => {
                    eprintln!("Failed to open LOG_FILE {}: {}", path, e);
                    (None, None)
                }
            }
        }
        _ => (None, None),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .with(env_filter)
            .init();
    }

    guard
}
