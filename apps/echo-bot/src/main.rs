use anyhow::{Context, Result};
use echo_bot::{AppState, BotConfig, router};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BotConfig::from_env()?;
    echo_telemetry::install("echo-bot")?;

    if config.credentials.auth_disabled() {
        warn!("MicrosoftAppId and MicrosoftAppPassword are unset; accepting unauthenticated requests");
    }

    let state = AppState::from_config(&config)?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let addr = listener.local_addr()?;
    info!("echo-bot listening on http://{addr}");
    info!("point the Bot Framework Emulator at http://{addr}/api/messages");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("echo-bot stopped");
    echo_telemetry::shutdown_telemetry();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received; draining connections");
}
