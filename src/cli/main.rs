/**
 * Zenith Sync Operator Entry Point
 *
 * Inspects and drains the local offline queue outside the app: pending
 * entries, dead letters and a one-shot sync against the configured backend.
 */

#[cfg(feature = "cli")]
mod app {
    use std::path::PathBuf;
    use std::sync::Arc;

    use clap::{Parser, Subcommand};

    use zenith::client::local_db::{LocalDatabase, QueueStore};
    use zenith::client::offline::{EntryId, OperationQueue, RetryPolicy};
    use zenith::client::remote::HttpRemote;
    use zenith::client::{AppState, Config, Session, SessionState};
    use zenith::shared::error::{Result, ZenithError};

    const ENV_USER_ID: &str = "ZENITH_USER_ID";
    const ENV_ACCESS_TOKEN: &str = "ZENITH_ACCESS_TOKEN";

    #[derive(Parser)]
    #[command(name = "zenith-sync", about = "Zenith offline queue operator tool")]
    struct Cli {
        /// Optional TOML configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,

        #[command(subcommand)]
        cmd: Cmd,
    }

    #[derive(Subcommand)]
    enum Cmd {
        /// Pending count, dead letters and last sync time
        Status,
        /// List pending queue entries
        Queue,
        /// Drain the queue against the configured backend
        Sync,
        /// Inspect or resolve dead-lettered entries
        DeadLetters {
            #[command(subcommand)]
            action: DeadLetterCmd,
        },
    }

    #[derive(Subcommand)]
    enum DeadLetterCmd {
        List,
        /// Put an entry back at the tail of the queue
        Requeue { id: String },
        /// Drop an entry for good
        Discard { id: String },
    }

    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        let config = Config::load(cli.config.as_deref())?;

        match cli.cmd {
            Cmd::Status => status(&config).await,
            Cmd::Queue => list_queue(&config).await,
            Cmd::Sync => sync(config).await,
            Cmd::DeadLetters { action } => dead_letters(&config, action).await,
        }
    }

    async fn open_queue(config: &Config) -> Result<OperationQueue> {
        let database = LocalDatabase::open(config.db_path()).await?;
        Ok(OperationQueue::new(
            QueueStore::new(database),
            RetryPolicy::from_config(config.app()),
            config.app().coalesce_updates,
        ))
    }

    async fn status(config: &Config) -> Result<()> {
        let queue = open_queue(config).await?;
        let last_sync = queue.store().load_last_sync().await?;

        println!("database:     {}", config.db_path().display());
        println!("pending:      {}", queue.len().await?);
        println!("dead letters: {}", queue.dead_letters().await?.len());
        match last_sync {
            Some(at) => println!("last sync:    {}", at.to_rfc3339()),
            None => println!("last sync:    never"),
        }
        Ok(())
    }

    async fn list_queue(config: &Config) -> Result<()> {
        let queue = open_queue(config).await?;
        let entries = queue.snapshot().await?;
        if entries.is_empty() {
            println!("queue is empty");
        }
        for entry in entries {
            let target = entry
                .match_value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{}  {:<6} {:<8} {}={}  attempts={}{}",
                entry.id,
                entry.operation,
                entry.table,
                entry.match_field,
                target,
                entry.attempts,
                entry
                    .last_error
                    .as_deref()
                    .map(|e| format!("  last error: {}", e))
                    .unwrap_or_default(),
            );
        }
        Ok(())
    }

    async fn sync(config: Config) -> Result<()> {
        let user_id = std::env::var(ENV_USER_ID).map_err(|_| ZenithError::NotAuthenticated)?;
        let session = SessionState::new();
        let remote = Arc::new(HttpRemote::from_config(&config, session.clone())?);
        let state = AppState::open_with_session(config, session, remote).await?;

        let mut login = Session::new(user_id);
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
            login = login.with_token(token);
        }
        state.session().establish(login);

        let outcome = state.sync().request_sync().await?;
        println!("{}", serde_json::to_string(&outcome)?);
        for letter in state.queue().dead_letters().await? {
            println!("dead letter {}: {}", letter.entry.id, letter.reason);
        }
        Ok(())
    }

    async fn dead_letters(config: &Config, action: DeadLetterCmd) -> Result<()> {
        let queue = open_queue(config).await?;
        match action {
            DeadLetterCmd::List => {
                for letter in queue.dead_letters().await? {
                    println!(
                        "{}  {:<6} {:<8} failed {}  {}",
                        letter.entry.id,
                        letter.entry.operation,
                        letter.entry.table,
                        letter.failed_at.to_rfc3339(),
                        letter.reason
                    );
                }
            }
            DeadLetterCmd::Requeue { id } => {
                let requeued = queue.requeue_dead_letter(&EntryId::from(id)).await?;
                println!("requeued as {}", requeued);
            }
            DeadLetterCmd::Discard { id } => {
                let letter = queue.discard_dead_letter(&EntryId::from(id)).await?;
                println!("discarded {} ({})", letter.entry.id, letter.reason);
            }
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = app::run().await {
        tracing::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("zenith-sync requires the 'cli' feature to be enabled.");
    eprintln!("Run with: cargo run --bin zenith-sync --features cli");
    std::process::exit(1);
}
