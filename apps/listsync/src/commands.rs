//! Subcommand implementations.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use listsync_feed::{FeedParser, HttpFeedSource};
use listsync_reconcile::{DiffOptions, PgMappingStore, ReconciliationEngine};
use listsync_target::WebflowClient;

use crate::config::AppConfig;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Update every mapped listing, ignoring content digests
    #[arg(long)]
    pub force_full_resync: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Compute the plan as a full resync
    #[arg(long)]
    pub force_full_resync: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Remove mapping records whose collection item no longer exists
    #[arg(long)]
    pub repair: bool,
}

/// Exit code for a successful command.
const EXIT_OK: u8 = 0;
/// Exit code when a command finished but found problems.
const EXIT_PARTIAL: u8 = 2;

const DELETION_GUARD_HINT: &str =
    "raise MAX_DELETE_FRACTION (up to 1) or MIN_DELETES_ALLOWED to let these deletions through";

/// Run one reconciliation pass and print its report.
pub async fn run(config: &AppConfig, args: RunArgs) -> anyhow::Result<u8> {
    let engine = build_engine(config).await?;
    let token = engine.cancellation_token();
    cancel_on_ctrl_c(token);

    let options = DiffOptions {
        force_full_resync: args.force_full_resync,
    };
    let report = engine.run_with(options).await;
    if report.error_code.as_deref() == Some("DELETION_GUARD") {
        warn!(hint = DELETION_GUARD_HINT, "Run blocked by the deletion guard");
    }
    print_json(&report)?;

    Ok(u8::try_from(report.status.exit_code()).unwrap_or(1))
}

/// Print the plan without applying it.
pub async fn plan(config: &AppConfig, args: PlanArgs) -> anyhow::Result<u8> {
    let engine = build_engine(config).await?;
    let options = DiffOptions {
        force_full_resync: args.force_full_resync,
    };
    let preview = engine
        .preview(options)
        .await
        .context("failed to compute plan")?;
    print_json(&preview)?;

    if let Some(reason) = &preview.blocked_by {
        warn!(reason = %reason, hint = DELETION_GUARD_HINT, "Plan would be blocked");
        return Ok(EXIT_PARTIAL);
    }
    Ok(EXIT_OK)
}

/// Compare the collection with the mapping store.
pub async fn audit(config: &AppConfig, args: AuditArgs) -> anyhow::Result<u8> {
    let engine = build_engine(config).await?;
    let drift = engine
        .audit(args.repair)
        .await
        .context("drift audit failed")?;
    print_json(&drift)?;

    Ok(if drift.is_clean() { EXIT_OK } else { EXIT_PARTIAL })
}

/// Apply pending mapping store migrations.
pub async fn migrate(config: &AppConfig) -> anyhow::Result<u8> {
    let store = connect_store(config).await?;
    store
        .ensure_schema()
        .await
        .context("failed to apply migrations")?;
    info!("Mapping store schema is up to date");
    Ok(EXIT_OK)
}

async fn connect_store(config: &AppConfig) -> anyhow::Result<PgMappingStore> {
    let database_url = config.require_database_url()?;
    PgMappingStore::connect(database_url)
        .await
        .context("failed to connect to the mapping store")
}

async fn build_engine(config: &AppConfig) -> anyhow::Result<ReconciliationEngine> {
    let store = connect_store(config).await?;

    let feed = HttpFeedSource::new(config.xml_endpoint.clone(), config.feed_timeout())
        .context("invalid feed endpoint")?;
    let parser = FeedParser::new(
        config
            .parser_options()
            .context("failed to load video listings")?,
    );
    let target =
        WebflowClient::new(config.webflow_config()).context("invalid Webflow configuration")?;

    info!(
        feed = %config.xml_endpoint,
        collection = %config.collection_id,
        max_delete_fraction = config.engine.max_delete_fraction,
        apply_concurrency = config.engine.apply_concurrency,
        "Reconciliation engine configured"
    );

    Ok(ReconciliationEngine::new(
        Arc::new(feed),
        parser,
        Arc::new(store),
        Arc::new(target),
    )
    .with_config(config.engine.clone()))
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight items");
            token.cancel();
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}
