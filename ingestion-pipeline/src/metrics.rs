use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use common::{error::AppError, utils::config::AppConfig};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::IngestionError;

const PUSH_JOB: &str = "ingest";
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Run counters shared by every candidate unit of an ingestion run.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    candidates: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    duration_millis: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub candidates: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub duration: Duration,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.candidates.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.duration_millis.store(0, Ordering::Relaxed);
    }

    pub fn record_candidates(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        self.candidates.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.duration_millis.store(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            candidates: self.candidates.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duration: Duration::from_millis(self.duration_millis.load(Ordering::Relaxed)),
        }
    }
}

impl MetricsSnapshot {
    /// Prometheus text exposition of the run.
    pub fn to_prometheus(&self) -> String {
        let mut body = String::new();
        let samples = [
            ("ingest_candidates_count", "counter", self.candidates.to_string()),
            ("ingest_metadata_success_count", "counter", self.succeeded.to_string()),
            ("ingest_metadata_failure_count", "counter", self.failed.to_string()),
            (
                "ingest_duration_seconds",
                "gauge",
                format!("{:.3}", self.duration.as_secs_f64()),
            ),
        ];
        for (name, kind, value) in samples {
            body.push_str(&format!("# TYPE {name} {kind}\n{name} {value}\n"));
        }
        body
    }
}

/// Pushes run metrics to a Prometheus push gateway.
#[derive(Clone)]
pub struct MetricsPusher {
    client: reqwest::Client,
    endpoint: String,
}

impl MetricsPusher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/metrics/job/{PUSH_JOB}", base_url.trim_end_matches('/')),
        })
    }

    /// `Ok(None)` when no push gateway is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, AppError> {
        config
            .metrics_push_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Self::new(url, Duration::from_secs(config.http_timeout_secs)))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn push(&self, snapshot: &MetricsSnapshot) -> Result<(), IngestionError> {
        self.client
            .put(&self.endpoint)
            .header(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
            .body(snapshot.to_prometheus())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| IngestionError::MetricsPush(AppError::from(err)))?;

        debug!(endpoint = %self.endpoint, "pushed ingestion metrics");
        Ok(())
    }
}
