use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "standings",
    about = "Portal score synchronization and ranking service",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "standings.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize the data directory, configuration, and database
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/standings")]
        data_dir: String,
    },
    /// Import a student roster CSV
    Import {
        /// Path to the roster CSV file
        csv: String,
        /// Parse and report without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one reconciliation sweep immediately
    Sync,
    /// Show roster, cache, and reconciliation status
    Status,
    /// Run the daily reconciliation scheduler until interrupted
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            commands::init::run(&data_dir).await?;
        }
        Commands::Import { csv, dry_run } => {
            commands::import::run(&cli.config, &csv, dry_run).await?;
        }
        Commands::Sync => {
            commands::sync::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Run => {
            commands::run::run(&cli.config).await?;
        }
    }

    Ok(())
}
