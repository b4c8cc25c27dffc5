use anyhow::Result;
use chargeflow::cli::{self, Args};
use chargeflow::logging::init_logging;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = args
        .load_config()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Chargeflow starting against {}", config.api.base_url);

    match cli::run(args.command, &config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Command failed: {}", e);
            if e.needs_admin_follow_up() {
                error!("Manual port release required");
            }
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}
