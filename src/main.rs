//! lead-intake server entry point

use anyhow::{Context, Result};
use tracing::{info, warn};

use lead_intake::infrastructure::http::{AppState, build_router, serve};
use lead_intake::infrastructure::logging::{init_logging_with_config, log_system_info};
use lead_intake::infrastructure::{ConfigManager, DatabaseConnection};

#[tokio::main]
async fn main() -> Result<()> {
    let manager = ConfigManager::new()?;
    manager.initialize_on_first_run().await?;
    let config = manager.load()?;

    init_logging_with_config(&config.logging)?;
    log_system_info();
    if let Some(path) = manager.config_path() {
        info!("📄 configuration file: {}", path.display());
    }
    if config.security.api_key_pepper.is_empty() {
        warn!("API key pepper is empty; set API_KEY_PEPPER in production");
    }
    if config.security.cron_secret.is_none() {
        warn!("CRON_SECRET is not set; cron endpoints will reject every call");
    }

    let db = DatabaseConnection::with_max_connections(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    db.migrate().await?;

    let state = AppState::from_config(&config, &db);
    let router = build_router(state, config.server.body_limit_bytes);
    serve(router, &config.server.bind_address).await
}
