use anyhow::Result;
use clap::{Parser, Subcommand};
use imkitchen_shared::today::CompletionStatus;

mod cli {
    pub mod today;
}

/// imkitchen - Today's plan, online or not
#[derive(Parser)]
#[command(name = "imkitchen")]
#[command(about = "Track today's meal plan completions", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Start with the connectivity monitor reporting offline
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's slots and the next one up
    Today,
    /// List yesterday's slots that were never marked
    Review,
    /// Mark a slot with a completion status
    Complete {
        slot_id: String,

        #[arg(long, short, default_value = "followed")]
        status: CompletionStatus,
    },
    /// Clear a slot's completion
    Uncomplete { slot_id: String },
    /// List completions waiting to be synced
    Queue,
    /// Replay queued completions and refetch today
    Sync,
    /// Run local store migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = imkitchen::config::Config::load(cli.config.clone())?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    imkitchen::observability::init_observability(&config.observability.log_level)?;

    let online = !cli.offline;

    match cli.command {
        Commands::Today => cli::today::show(config, online).await,
        Commands::Review => cli::today::review(config).await,
        Commands::Complete { slot_id, status } => {
            cli::today::complete(config, online, slot_id, status).await
        }
        Commands::Uncomplete { slot_id } => cli::today::uncomplete(config, online, slot_id).await,
        Commands::Queue => cli::today::queue(config).await,
        Commands::Sync => cli::today::sync(config).await,
        Commands::Migrate => cli::today::migrate(config).await,
    }
}
