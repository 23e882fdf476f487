//! msgdb CLI - inspect a relay's message database

use clap::{Parser, Subcommand};
use msgdb::config::{self, SqliteConfig};
use msgdb::{MessageKind, SqliteStore, StoredMessage};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "msgdb")]
#[command(version)]
#[command(about = "Embedded message store for chat relays")]
#[command(long_about = r#"
msgdb keeps group and private chat messages so replies and forwards can
be resolved by global id.

Example usage:
  msgdb init
  msgdb get --global-id 123456
  msgdb stats --config relay.toml
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database directory, file and tables
    Init,

    /// Print a stored message as JSON
    Get {
        /// Global id of the message
        #[arg(short, long)]
        global_id: i32,

        /// Restrict the lookup to one kind (group, private)
        #[arg(short, long)]
        kind: Option<MessageKind>,
    },

    /// Show row counts per table
    Stats,
}

fn open_store(config_path: Option<&std::path::Path>) -> anyhow::Result<SqliteStore> {
    let config = config::load_config(config_path)?;
    let sqlite: SqliteConfig = config.sqlite()?.unwrap_or_default();
    if !sqlite.enable {
        anyhow::bail!("sqlite3 backend is disabled in the config");
    }
    let store = SqliteStore::open(&sqlite.database_file(), sqlite.ttl()?)?
        .with_linkage(sqlite.linkage());
    Ok(store)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let store = open_store(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let stats = store.stats()?;
            println!("✅ Message database ready");
            print!("{}", stats);
        }

        Commands::Get { global_id, kind } => {
            let message: StoredMessage = match kind {
                Some(MessageKind::Group) => store.get_group_message_by_global_id(global_id)?.into(),
                Some(MessageKind::Private) => store.get_private_message_by_global_id(global_id)?.into(),
                None => store.get_message_by_global_id(global_id)?,
            };
            println!("{}", serde_json::to_string_pretty(&message)?);
        }

        Commands::Stats => {
            let stats = store.stats()?;
            println!("📊 Message database statistics (ttl {:?})", store.expiry().ttl());
            println!("{}", msgdb::ui::stats_table(&stats));
        }
    }

    Ok(())
}
