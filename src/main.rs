use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use hikari::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start => {
            // Tracing is set up after config load so log_level/log_format apply
            commands::start::execute().await?;
        }
        cli::Commands::Config { action } => {
            init_tracing("warn", "text");
            match action {
                cli::ConfigCommands::Show => commands::config::show()?,
                cli::ConfigCommands::Validate => commands::config::validate()?,
            }
        }
        cli::Commands::Version => {
            println!("hikari collector v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
