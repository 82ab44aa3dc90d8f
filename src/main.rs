//! Repokeeper CLI entry point.

use clap::Parser;

use repokeeper::cli::{handle_error, Cli, Commands};
use repokeeper::infrastructure::config::ConfigLoader;
use repokeeper::infrastructure::logging::Logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Reconcile(args) => {
            repokeeper::cli::commands::reconcile::execute(args, &config, cli.json).await
        }
        Commands::CheckConfig => repokeeper::cli::commands::check_config::execute(&config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
