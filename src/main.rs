// file: src/main.rs
// version: 1.2.0
// guid: h8i9j0k1-l2m3-4567-8901-234567hijklm

//! Offline Kubernetes installer - main entry point

use clap::Parser;
use k8s_airgap_installer::{
    cli::{args::Cli, args::Commands, commands::*},
    logging::logger,
};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logger(cli.verbose, cli.quiet) {
        eprintln!("failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Install {
            config,
            dry_run,
            report,
        } => install_command(&config, dry_run, report.as_deref()).await,
        Commands::Validate { config } => validate_command(&config).await,
        Commands::ListImages { config, json } => {
            list_images_command(config.as_deref(), json).await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
