use clap::Parser;
use dotenv::dotenv;

use orderkeeper::cli::{Cli, Commands};
use orderkeeper::commands;
use orderkeeper::observability::{init_tracing, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from the .env file
    dotenv().ok();

    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = init_tracing(&cli.verbose, format) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match &cli.command {
        Commands::Run { config, seed } => {
            commands::run_engine(config, seed.as_deref()).await?;
        }
        Commands::ListOrders { store_dir } => {
            commands::run_list_orders(store_dir).await?;
        }
        Commands::ListPositions { store_dir } => {
            commands::run_list_positions(store_dir).await?;
        }
        Commands::CheckConfig { config } => {
            commands::run_check_config(config)?;
        }
    }

    Ok(())
}
