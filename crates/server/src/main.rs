mod bootstrap;
mod health;
mod oauth;
mod webhook;

use anyhow::Result;
use axum::Router;
use ocbot_core::config::{load_env_file, AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use ocbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn app_router(state: bootstrap::AppState) -> Router {
    Router::new()
        .merge(webhook::router(state.clone()))
        .merge(oauth::router(state.clone()))
        .merge(health::router(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let env_file = load_env_file(None);
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);
    if let Some(path) = env_file {
        tracing::debug!(event_name = "system.config.env_file", path = %path.display(), "loaded .env");
    }

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "ocbot-server listening"
    );
    axum::serve(listener, app_router(app.state)).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "ocbot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
    }
}
