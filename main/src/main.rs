mod args;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use ingestion_pipeline::{
    run_ingestion, CandidateOutcome, IngestionMetrics, IngestionPipeline, MetricsPusher,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();
    let config = get_config().context("loading configuration")?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await
        .context("connecting to surrealdb")?,
    );
    db.ensure_initialized().await?;

    let storage = StorageManager::new(&config)
        .await
        .context("opening readme storage")?;
    let pipeline = IngestionPipeline::new(Arc::clone(&db), &config, storage)?;
    let pusher = MetricsPusher::from_config(&config)?;
    let metrics = Arc::new(IngestionMetrics::new());

    let report = run_ingestion(&pipeline, &args.selection(), &metrics, pusher.as_ref()).await?;

    for outcome in &report.outcomes {
        if let CandidateOutcome::Failed { package_id, error } = outcome {
            warn!(%package_id, error = %error, "package not ingested");
        }
    }
    info!(
        candidates = report.candidates,
        succeeded = report.succeeded,
        failed = report.failed,
        duration_secs = report.duration.as_secs_f64(),
        "ingestion complete"
    );

    Ok(())
}
