use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use supportdesk::api_router::configure_api_routes;
use supportdesk::config::AppConfig;
use supportdesk::notifier;
use supportdesk::shared::state::AppState;
use supportdesk::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env()?;
    let pool = match create_conn(&config.database_url()) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(e.into());
        }
    };
    run_migrations(&pool)?;

    let notifier = notifier::from_config(config.smtp.as_ref());
    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
        notifier,
    });

    let app = configure_api_routes().with_state(state);

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
