use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reader_import::config::Config;
use reader_import::feed::HttpFeedSynchronizer;
use reader_import::import::{ImportOutcome, ImportRequest, ImportWorker, Importer};
use reader_import::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/reader-import/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("reader-import"))
}

/// Create the config directory with user-only access.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "reader-import",
    about = "Import OPML subscriptions and starred articles into a feed reader database"
)]
struct Args {
    /// Config file (default: ~/.config/reader-import/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and its root category
    AddUser { name: String },

    /// Import an OPML file or a zip bundle for a user
    Import {
        /// Name of the importing user
        #[arg(long)]
        user: String,

        /// Delete the file once the import has ended
        #[arg(long)]
        remove: bool,

        file: PathBuf,
    },

    /// Show the progress and event log of an import job
    Progress { job_id: i64 },
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: The database is locked by another process. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            ensure_config_dir(&config_dir)?;
            config_dir.join("reader.db")
        }
    };
    let db = open_database(&db_path).await?;

    match args.command {
        Command::AddUser { name } => add_user(&db, &name).await,
        Command::Import { user, remove, file } => {
            import(&db, &config, &user, &file, remove).await
        }
        Command::Progress { job_id } => progress(&db, job_id).await,
    }
}

async fn add_user(db: &Database, name: &str) -> Result<()> {
    if db.get_user_by_name(name).await?.is_some() {
        bail!("User '{}' already exists", name);
    }
    let user = db.create_user(name).await.context("Failed to create user")?;
    println!("Created user '{}' with id {}", user.username, user.id);
    Ok(())
}

async fn import(
    db: &Database,
    config: &Config,
    user: &str,
    file: &Path,
    remove: bool,
) -> Result<()> {
    let user = db
        .get_user_by_name(user)
        .await?
        .with_context(|| format!("No user named '{}'", user))?;

    // SEC-008: Canonicalize to resolve symlinks before handing the path over
    let path = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    if !std::fs::metadata(&path)?.is_file() {
        bail!("Import path must be a regular file");
    }

    let sync = HttpFeedSynchronizer::new(db.clone(), config.sync_settings())
        .context("Failed to create HTTP client")?;
    let importer = Importer::new(Arc::new(db.clone()), Arc::new(sync))
        .with_temp_dir(config.temp_dir.clone());
    let (queue, worker) = ImportWorker::spawn(importer, config.queue_capacity);

    let ticket = queue
        .enqueue(ImportRequest {
            user_id: user.id,
            path,
            remove_when_done: remove,
        })
        .await?;
    println!("Import queued for '{}'", user.username);
    drop(queue);

    let result = ticket.outcome().await;
    worker.await.context("Import worker panicked")?;

    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_outcome(outcome: &ImportOutcome) {
    println!("Job {} finished", outcome.job_id);
    println!(
        "  Feeds:   {} imported, {} failed",
        outcome.feeds.succeeded, outcome.feeds.failed
    );
    println!(
        "  Starred: {} imported, {} failed",
        outcome.starred.succeeded, outcome.starred.failed
    );
    for failure in outcome
        .feeds
        .failures
        .iter()
        .chain(outcome.starred.failures.iter())
    {
        println!("  ! {}: {}", failure.identity, failure.reason);
    }
    if let Some(reason) = &outcome.aborted {
        println!("  Import stopped early: {}", reason);
    }
}

async fn progress(db: &Database, job_id: i64) -> Result<()> {
    if db.get_job(job_id).await?.is_none() {
        bail!("No job with id {}", job_id);
    }
    let progress = db.job_progress(job_id).await?;

    println!(
        "Job {}: {}/{} items ({:.0}%), {} failed{}",
        progress.job_id,
        progress.processed,
        progress.total(),
        progress.fraction() * 100.0,
        progress.failed,
        if progress.finished { ", finished" } else { "" }
    );
    for event in db.get_job_events(job_id).await? {
        println!("  {:<32} {}", event.event_type, event.message);
    }
    Ok(())
}
