use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;

use config::StrongboxConfig;

/// Environment variable holding the backup encryption key
pub const KEY_ENV: &str = "STRONGBOX_BACKUP_KEY";

#[derive(Parser, Debug)]
#[command(name = "strongbox", version)]
#[command(about = "Strongbox - encrypted database backups and restores")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "STRONGBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Encryption key (defaults to $STRONGBOX_BACKUP_KEY)
    #[arg(long, global = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export the database into a new encrypted backup
    Create,
    /// Replace the database contents with a stored backup
    Restore {
        /// Backup file name as shown by `list`
        file: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List stored backups, oldest first
    List,
    /// Delete a stored backup
    Delete {
        /// Backup file name
        file: String,
    },
    /// Show the current restore status
    Status {
        /// Print the raw status record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all but the newest backups
    Prune {
        /// Number of backups to keep
        #[arg(long, default_value_t = 7)]
        retain: usize,
    },
}

#[tokio::main]
async fn main() {
    // Initialize JSON logging once.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .try_init();

    let cli = Cli::parse();

    let config = match StrongboxConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let key = cli.key;
    let result = match cli.command {
        Commands::Create => commands::create(&config, key).await,
        Commands::Restore { file, yes } => commands::restore(&config, key, &file, yes).await,
        Commands::List => commands::list(&config).await,
        Commands::Delete { file } => commands::delete(&config, &file).await,
        Commands::Status { json } => commands::status(&config, json).await,
        Commands::Prune { retain } => commands::prune(&config, retain).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}
