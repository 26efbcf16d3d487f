use anyhow::Result;
use colored::Colorize;
use hikari::{config, init_tracing, server};
use tracing::info;

/// Execute the start command
///
/// Loads and validates configuration, initializes logging from it, then
/// runs the server until shutdown.
pub async fn execute() -> Result<()> {
    let cfg = config::load_config()?;
    init_tracing(&cfg.log_level, &cfg.log_format);

    println!("{}", "Starting hikari collector...".green());
    info!(
        database_url = %super::config::mask_database_url(&cfg.database_url),
        "Starting hikari collector"
    );

    server::start_server(cfg).await?;

    Ok(())
}
