use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use catalog_mirror::cms::CmsClient;
use catalog_mirror::orchestrator::SyncOrchestrator;
use catalog_mirror::webhook::{WebhookEvent, WebhookIngestor, WebhookOutcome};
use catalog_mirror::{config, db};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a single module by slug.
    SyncOne { slug: String },
    /// Reconcile the full catalog (published primary modules plus all mirror items).
    SyncAll,
    /// Show the sync status of one module without writing anything.
    Status { slug: String },
    /// Delete a module's mirror item and clear its mirror linkage.
    DeleteMirror { slug: String },
    /// Process a webhook event payload from a JSON file.
    Webhook {
        /// Path to the event JSON, e.g. {"type":"item.updated","item_id":"..."}
        event: PathBuf,
    },
    /// Print an example config file to stdout.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if matches!(args.command, Command::InitConfig) {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/catalog.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let cms = Arc::new(CmsClient::from_config(&cfg)?);
    let orchestrator = Arc::new(SyncOrchestrator::new(pool.clone(), cms.clone(), &cfg));

    match args.command {
        Command::SyncOne { slug } => {
            let result = orchestrator.sync_one(&slug).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::SyncAll => {
            let result = orchestrator.sync_all().await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Status { slug } => {
            let status = orchestrator.sync_status(&slug).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::DeleteMirror { slug } => {
            orchestrator.delete_mirror(&slug).await?;
            info!(slug, "mirror deletion flow finished");
        }
        Command::Webhook { event } => {
            let payload = tokio::fs::read_to_string(&event)
                .await
                .with_context(|| format!("failed to read event file {}", event.display()))?;
            let event: WebhookEvent =
                serde_json::from_str(&payload).context("invalid webhook event JSON")?;
            let ingestor = WebhookIngestor::new(
                pool.clone(),
                cms,
                orchestrator.clone(),
                cfg.cms.webhook_secret.clone(),
            );
            match ingestor.ingest(event).await? {
                WebhookOutcome::Synced { slug, result } => {
                    info!(slug, "webhook sync finished");
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                WebhookOutcome::Ignored { reason } => {
                    println!("ignored: {}", reason);
                }
            }
        }
        Command::InitConfig => unreachable!("handled above"),
    }

    Ok(())
}
