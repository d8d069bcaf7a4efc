mod cli;
mod commands;
mod display;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    tracing::debug!("rob2 v{}", env!("CARGO_PKG_VERSION"));
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Evaluate(args) => commands::evaluate(args, config_path).await,
        Commands::Aggregate(args) => commands::aggregate_file(&args),
        Commands::Schema(args) => {
            commands::print_schema(&args);
            Ok(())
        }
        Commands::Paths(args) => {
            commands::print_paths(&args);
            Ok(())
        }
        Commands::Config => commands::print_config(config_path),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
