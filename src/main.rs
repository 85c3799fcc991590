use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use configuration::{ConfigArgs, Settings};
use core_types::{LookupOutcome, WatchlistEntry};
use database::{ArtifactPublisher, ArtifactStore, DbRepository, WatchlistStore};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value as JsonValue;
use services::{LookupService, WatchlistService};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main entry point for the StockAI service.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    let settings = configuration::load_settings_from(&cli.config.config)
        .context("Failed to load settings")?;
    let _log_guard = configuration::init_tracing(&settings.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Serve(args) => handle_serve(args, settings).await,
        Commands::Migrate => handle_migrate(&settings).await,
        Commands::Publish(args) => handle_publish(args, &settings).await,
        Commands::Lookup(args) => handle_lookup(args, &settings).await,
        Commands::Watchlist => handle_watchlist(&settings).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Serves precomputed stock analyses and the user watchlist.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Apply the database schema.
    Migrate,
    /// Write artifacts into the store, as the batch producer does.
    Publish(PublishArgs),
    /// Look up one artifact and print it.
    Lookup(LookupArgs),
    /// Print the watchlist.
    Watchlist,
}

#[derive(Parser)]
struct ServeArgs {
    /// Overrides `server.addr` from the configuration.
    #[arg(long)]
    addr: Option<SocketAddr>,
}

#[derive(Parser)]
struct PublishArgs {
    /// The instrument code to publish (e.g., "600519"). Requires --file.
    #[arg(long, requires = "file")]
    code: Option<String>,

    /// A JSON file holding one artifact payload.
    #[arg(long, conflicts_with = "dir")]
    file: Option<PathBuf>,

    /// A directory of `<code>.json` payloads to publish concurrently.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Parser)]
struct LookupArgs {
    /// The instrument code to look up.
    #[arg(long)]
    code: String,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_serve(args: ServeArgs, mut settings: Settings) -> anyhow::Result<()> {
    if let Some(addr) = args.addr {
        settings.server.addr = addr;
    }
    web_server::run_server(settings).await
}

async fn handle_migrate(settings: &Settings) -> anyhow::Result<()> {
    let pool = database::connect(&settings.database)
        .await
        .context("Failed to connect to database")?;
    database::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    pool.close().await;
    println!("Migrations applied.");
    Ok(())
}

/// Handles the orchestration of a publish run.
async fn handle_publish(args: PublishArgs, settings: &Settings) -> anyhow::Result<()> {
    let jobs = match (args.code, args.file, args.dir) {
        (Some(code), Some(file), None) => vec![(code, file)],
        (None, Some(file), None) => vec![(code_from_path(&file)?, file)],
        (None, None, Some(dir)) => collect_artifact_files(&dir)?,
        _ => bail!("Use either --file (optionally with --code) or --dir."),
    };
    if jobs.is_empty() {
        println!("Nothing to publish.");
        return Ok(());
    }

    let pool = database::connect(&settings.database)
        .await
        .context("Failed to connect to database")?;
    let repo = DbRepository::new(pool);
    repo.ensure_artifact_table().await?;

    // Set up the progress bar
    let progress_bar = ProgressBar::new(jobs.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let publisher: Arc<dyn ArtifactPublisher> = Arc::new(repo.clone());
    let failures = publish_all(jobs, publisher, &progress_bar).await;
    progress_bar.finish_with_message("Publish complete!");
    repo.close().await;

    if failures > 0 {
        bail!("{} artifact(s) failed to publish", failures);
    }
    Ok(())
}

/// Publishes every job concurrently and returns how many failed. The progress
/// bar advances once per job, whether it succeeded or not.
async fn publish_all(
    jobs: Vec<(String, PathBuf)>,
    publisher: Arc<dyn ArtifactPublisher>,
    progress_bar: &ProgressBar,
) -> usize {
    // Create concurrent tasks, one per artifact
    let tasks: Vec<_> = jobs
        .into_iter()
        .map(|(code, path)| {
            let publisher = publisher.clone();
            let pb = progress_bar.clone();
            tokio::spawn(async move {
                pb.set_message(format!("Publishing {}...", code));
                let result = publish_one(publisher.as_ref(), &code, &path).await;
                pb.inc(1);
                result.with_context(|| format!("Failed to publish {}", code))
            })
        })
        .collect();

    // Wait for all concurrent tasks to complete
    let mut failures = 0;
    for result in join_all(tasks).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                eprintln!("A publish failed: {:#}", e);
            }
            Err(e) => {
                failures += 1;
                eprintln!("A task failed: {}", e);
            }
        }
    }
    failures
}

async fn publish_one(
    publisher: &dyn ArtifactPublisher,
    code: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let payload = read_payload(path)?;
    let updated_at = publisher.publish_artifact(code, &payload).await?;
    tracing::info!(code = %code, %updated_at, "Artifact published.");
    Ok(())
}

async fn handle_lookup(args: LookupArgs, settings: &Settings) -> anyhow::Result<()> {
    let repo = database::connect_lazy(&settings.database)?.map(DbRepository::new);
    let store = repo.clone().map(|r| Arc::new(r) as Arc<dyn ArtifactStore>);
    let service = LookupService::from_settings(store, &settings.database);

    let outcome = service.lookup(&args.code).await;
    if let Some(repo) = repo {
        repo.close().await;
    }

    match outcome? {
        LookupOutcome::Ready(document) => {
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(())
        }
        LookupOutcome::Pending { message } => {
            println!("pending: {}", message);
            Ok(())
        }
        LookupOutcome::Unavailable(reason) => bail!("{}", reason),
    }
}

async fn handle_watchlist(settings: &Settings) -> anyhow::Result<()> {
    let repo = database::connect_lazy(&settings.database)?.map(DbRepository::new);
    let store = repo.clone().map(|r| Arc::new(r) as Arc<dyn WatchlistStore>);
    let service = WatchlistService::from_settings(store, &settings.database);

    let listing = service.list().await;
    if let Some(repo) = repo {
        repo.close().await;
    }

    println!("{}", watchlist_table(&listing.entries));
    if let services::ListingSource::Fallback(cause) = listing.source {
        println!("(default list: {:?})", cause);
    }
    Ok(())
}

// ==============================================================================
// Helpers
// ==============================================================================

fn watchlist_table(entries: &[WatchlistEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Code", "Name", "Added"]);
    for entry in entries {
        table.add_row(vec![
            entry.code.clone(),
            entry.name.clone().unwrap_or_default(),
            entry
                .added_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

fn read_payload(path: &Path) -> anyhow::Result<JsonValue> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let payload = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(payload)
}

/// The instrument code a payload file is named after (`600519.json` -> `600519`).
fn code_from_path(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .filter(|code| !code.is_empty())
        .with_context(|| format!("Cannot derive a code from {}", path.display()))
}

/// All `*.json` files directly inside `dir`, paired with their codes, sorted by code.
fn collect_artifact_files(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut jobs = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            jobs.push((code_from_path(&path)?, path));
        }
    }
    jobs.sort();
    Ok(jobs)
}
