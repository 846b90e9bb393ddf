#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod error;
pub mod github;
pub mod metrics;
pub mod pipeline;
pub mod types;

use std::sync::Arc;

use tracing::{debug, warn};

pub use error::IngestionError;
pub use metrics::{IngestionMetrics, MetricsPusher, MetricsSnapshot};
pub use pipeline::{
    CandidateOutcome, CandidateSelection, IngestionConfig, IngestionPipeline, IngestionReport,
    IngestionTuning,
};

/// Runs one ingestion pass and pushes its metrics, whether or not the run succeeded.
///
/// A failed push is logged and never changes the run's result.
pub async fn run_ingestion(
    pipeline: &IngestionPipeline,
    selection: &CandidateSelection,
    metrics: &Arc<IngestionMetrics>,
    pusher: Option<&MetricsPusher>,
) -> Result<IngestionReport, IngestionError> {
    let result = pipeline.run(selection, metrics).await;

    match pusher {
        Some(pusher) => {
            if let Err(err) = pusher.push(&metrics.snapshot()).await {
                warn!(
                    endpoint = pusher.endpoint(),
                    error = %err,
                    "failed to push ingestion metrics"
                );
            }
        }
        None => debug!("no metrics push gateway configured; skipping push"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::storage::{db::SurrealDbClient, store::StorageManager};
    use common::utils::config::{AppConfig, StorageKind};
    use object_store::memory::InMemory;
    use uuid::Uuid;

    #[tokio::test]
    async fn unreachable_gateway_does_not_fail_the_run() {
        let database = Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("lib_test", &database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("initialize schema");

        let config = AppConfig {
            storage: StorageKind::Memory,
            github_api_url: "http://127.0.0.1:9".to_string(),
            http_timeout_secs: 1,
            ..AppConfig::default()
        };
        let storage = StorageManager::with_backend(Arc::new(InMemory::new()));
        let pipeline =
            IngestionPipeline::new(Arc::new(db), &config, storage).expect("pipeline builds");
        let pusher =
            MetricsPusher::new("http://127.0.0.1:9", Duration::from_secs(1)).expect("pusher");
        let metrics = Arc::new(IngestionMetrics::new());

        let report = run_ingestion(
            &pipeline,
            &CandidateSelection::Limit(5),
            &metrics,
            Some(&pusher),
        )
        .await
        .expect("empty run succeeds");

        assert_eq!(report.candidates, 0);
        assert_eq!(metrics.snapshot().candidates, 0);
    }
}
