use anyhow::Result;
use clap::Parser;

use registrar_core::cli::commands::{check::CheckCommand, serve::ServeCommand, status::StatusCommand};
use registrar_core::cli::{Cli, Commands};
use registrar_core::config::RegistrarConfig;
use registrar_core::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    RegistrarConfig::load_env_file()?;
    let config = RegistrarConfig::load()?;
    if config.observability.tracing_enabled {
        init_telemetry(&config.observability.log_level)?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        // Default behavior: no subcommand - run the lifecycle service
        None => runtime.block_on(async { ServeCommand::new(false).execute(&config).await }),
        Some(Commands::Serve { once }) => {
            runtime.block_on(async { ServeCommand::new(once).execute(&config).await })
        }
        Some(Commands::Check { domain }) => {
            runtime.block_on(async { CheckCommand::new(domain).execute(&config).await })
        }
        Some(Commands::Status) => {
            runtime.block_on(async { StatusCommand::new().execute(&config).await })
        }
    }
}
