//! CLI argument parsing

use crate::backends::Backends;
use crate::commands;
use aquastat::StatConfig;
use clap::{Parser, Subcommand};

/// Aquastat worker - API usage counters with durable backup
#[derive(Parser, Debug)]
#[command(name = "aquastat-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use in-memory stores even when Redis/Postgres URLs are configured
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restore counters, then consume tracking events from stdin
    Run,

    /// Print the current usage report as JSON
    Report,

    /// Copy counters to the durable store once
    Backup,

    /// Overwrite counters from the durable store once
    Migrate,

    /// Create the durable table and index if missing
    InitSchema,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> anyhow::Result<()> {
        let config = StatConfig::from_env()?;
        aquastat::logging::init_tracing(&config.log);

        let memory = self.memory;
        match self.command {
            Commands::Run => {
                let backends = backends(memory, &config).await?;
                commands::run(config, backends).await
            }
            Commands::Report => commands::report(backends(memory, &config).await?).await,
            Commands::Backup => commands::backup(backends(memory, &config).await?).await,
            Commands::Migrate => commands::migrate(backends(memory, &config).await?).await,
            Commands::InitSchema => commands::init_schema(&config).await,
        }
    }
}

async fn backends(memory: bool, config: &StatConfig) -> anyhow::Result<Backends> {
    if memory {
        Ok(Backends::in_memory())
    } else {
        Backends::connect(config).await
    }
}
