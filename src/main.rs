// src/main.rs
use std::net::SocketAddr;

use serde_json::json;
use tokio::net::TcpListener;

use reqlog::logging::{context, get_logger};
use reqlog::{build_router, setup_logging, try_get_settings, AppState};

/// Main entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = try_get_settings()?;
    setup_logging(&settings)?;

    let logger = get_logger("reqlog");
    tracing::debug!(?settings, "Loaded configuration");

    let app = build_router(AppState::new(settings.clone()));

    let listener = TcpListener::bind(settings.bind_address()).await?;
    logger.info(
        "Server starting",
        &context([
            ("app_name", json!(settings.app_name)),
            ("version", json!(settings.app_version)),
            ("environment", json!(settings.environment.as_str())),
            ("debug", json!(settings.debug)),
            ("address", json!(listener.local_addr()?.to_string())),
        ]),
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    logger.info("Server stopped", &context([]));
    Ok(())
}

async fn shutdown_signal() {
    let logger = get_logger("reqlog");

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            logger.error(
                "Failed to install Ctrl+C handler",
                &context([("error", json!(err.to_string()))]),
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                logger.error(
                    "Failed to install terminate signal handler",
                    &context([("error", json!(err.to_string()))]),
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    logger.info("Shutdown signal received", &context([]));
}
