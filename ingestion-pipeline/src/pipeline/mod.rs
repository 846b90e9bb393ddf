mod config;
mod merge;
mod readme_cache;
mod selection;
mod services;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
pub use merge::{merge, normalize_keywords};
pub use readme_cache::needs_update;
pub use selection::{fetch_candidates, Candidate, CandidateSelection};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultIngestionServices, IngestionServices};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            package::{Package, PackageStatus, ProcessingStage},
            repository::Repository,
        },
    },
    utils::config::AppConfig,
};
use futures::future::join_all;
use state_machines::core::GuardError;
use tracing::{debug, error, info, warn};

use self::state::selected;
use crate::{error::IngestionError, github::GithubClient, metrics::IngestionMetrics};

/// How a single candidate's attempt ended.
#[derive(Debug)]
pub enum CandidateOutcome {
    Succeeded {
        package_id: String,
        repository: Box<Repository>,
    },
    Failed {
        package_id: String,
        error: IngestionError,
    },
}

impl CandidateOutcome {
    pub fn package_id(&self) -> &str {
        match self {
            CandidateOutcome::Succeeded { package_id, .. }
            | CandidateOutcome::Failed { package_id, .. } => package_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CandidateOutcome::Succeeded { .. })
    }
}

#[derive(Debug)]
pub struct IngestionReport {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
    /// One entry per candidate, in selection order.
    pub outcomes: Vec<CandidateOutcome>,
}

#[derive(Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    pipeline_config: IngestionConfig,
    services: Arc<dyn IngestionServices>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        storage: StorageManager,
    ) -> Result<Self, AppError> {
        let github = GithubClient::from_config(config)?;
        let services = DefaultIngestionServices::new(github, storage);

        Ok(Self::with_services(
            db,
            IngestionConfig::from_app_config(config),
            Arc::new(services),
        ))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        pipeline_config: IngestionConfig,
        services: Arc<dyn IngestionServices>,
    ) -> Self {
        Self {
            db,
            pipeline_config,
            services,
        }
    }

    /// Ingests every selected candidate concurrently and waits for all of them.
    ///
    /// Only selection errors are returned; per-candidate failures end up in the report.
    #[tracing::instrument(skip_all, fields(selection = ?selection))]
    pub async fn run(
        &self,
        selection: &CandidateSelection,
        metrics: &Arc<IngestionMetrics>,
    ) -> Result<IngestionReport, IngestionError> {
        metrics.reset();
        let started = Instant::now();

        let stale_before = self.pipeline_config.stale_before(Utc::now());
        let candidates = fetch_candidates(&self.db, selection, stale_before).await?;
        metrics.record_candidates(candidates.len());
        info!(candidates = candidates.len(), "starting ingestion run");

        let units = candidates.into_iter().map(|candidate| {
            let package_id = candidate.package.id.clone();
            let pipeline = self.clone();
            let metrics = Arc::clone(metrics);
            let handle =
                tokio::spawn(async move { pipeline.process_candidate(candidate, &metrics).await });
            async move { (package_id, handle.await) }
        });

        let mut outcomes = Vec::new();
        for (package_id, joined) in join_all(units).await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let error = IngestionError::TaskAborted(join_error.to_string());
                    error!(%package_id, error = %error, "ingestion unit did not complete");
                    metrics.record_failure();
                    self.record_status(&package_id, error.package_status())
                        .await;
                    CandidateOutcome::Failed { package_id, error }
                }
            };
            outcomes.push(outcome);
        }

        let duration = started.elapsed();
        metrics.record_duration(duration);

        let succeeded = outcomes.iter().filter(|outcome| outcome.is_success()).count();
        let report = IngestionReport {
            candidates: outcomes.len(),
            succeeded,
            failed: outcomes.len().saturating_sub(succeeded),
            duration,
            outcomes,
        };
        info!(
            candidates = report.candidates,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            "ingestion run finished"
        );

        Ok(report)
    }

    async fn process_candidate(
        &self,
        candidate: Candidate,
        metrics: &IngestionMetrics,
    ) -> CandidateOutcome {
        let package_id = candidate.package.id.clone();

        match self.drive_candidate(candidate).await {
            Ok(repository) => {
                metrics.record_success();
                self.record_status(&package_id, PackageStatus::Ok).await;
                CandidateOutcome::Succeeded {
                    package_id,
                    repository: Box::new(repository),
                }
            }
            Err(error) => {
                metrics.record_failure();
                self.record_status(&package_id, error.package_status())
                    .await;
                CandidateOutcome::Failed { package_id, error }
            }
        }
    }

    /// Moves the package into the ingestion stage with `status`. Failures are only logged.
    async fn record_status(&self, package_id: &str, status: PackageStatus) {
        if let Err(err) =
            Package::update_status(&self.db, package_id, status, ProcessingStage::Ingestion).await
        {
            error!(
                %package_id,
                status = status.as_str(),
                error = %err,
                "failed to update package status"
            );
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(package_id = %candidate.package.id, url = %candidate.package.url)
    )]
    async fn drive_candidate(&self, candidate: Candidate) -> Result<Repository, IngestionError> {
        let Candidate {
            package,
            repository,
        } = candidate;
        let url = package.url.as_str();

        let machine = selected()
            .fetch()
            .map_err(|(_, guard)| map_guard_error("fetch", &guard))?;

        let (metadata, license, readme) = tokio::join!(
            self.services.fetch_metadata(url),
            self.services.fetch_license(url),
            self.services.fetch_readme(url),
        );

        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(err) => return Err(abort(machine.abort(), IngestionError::MetadataFetch(err))),
        };
        let Some(remote) = metadata.repository.as_ref() else {
            let err = IngestionError::MissingRepositoryMetadata(package.id);
            return Err(abort(machine.abort(), err));
        };
        let license = license.unwrap_or_else(|err| {
            warn!(error = %err, "license fetch failed; continuing without license");
            None
        });
        let readme = readme.unwrap_or_else(|err| {
            warn!(error = %err, "readme fetch failed; continuing without readme");
            None
        });
        debug!(
            has_license = license.is_some(),
            has_readme = readme.is_some(),
            releases = remote.releases.len(),
            "fetched repository data"
        );

        let machine = machine
            .merge()
            .map_err(|(_, guard)| map_guard_error("merge", &guard))?;

        let existing = repository.unwrap_or_else(|| Repository::new(&package.id));
        let readme_cache = readme_cache::decide(
            self.services.as_ref(),
            &remote.owner,
            &remote.name,
            existing.readme_cache.clone(),
            readme.as_ref(),
        )
        .await;

        let merged = match merge(
            existing,
            &metadata,
            license.as_ref(),
            readme.as_ref(),
            readme_cache,
        ) {
            Ok(merged) => merged,
            Err(err) => return Err(abort(machine.abort(), err)),
        };
        let stored = match merged.upsert(&self.db).await {
            Ok(stored) => stored,
            Err(err) => return Err(abort(machine.abort(), IngestionError::Persistence(err))),
        };

        let _machine = machine
            .succeed()
            .map_err(|(_, guard)| map_guard_error("succeed", &guard))?;
        info!(stars = stored.stars, releases = stored.releases.len(), "repository ingested");

        Ok(stored)
    }
}

/// Moves the candidate into the failed state and logs why.
fn abort<M, S>(transition: Result<M, (S, GuardError)>, err: IngestionError) -> IngestionError {
    if let Err((_, guard)) = transition {
        let error = map_guard_error("abort", &guard);
        warn!(error = %error, "candidate could not be marked failed");
    }
    warn!(error = %err, "ingestion candidate failed");
    err
}

fn map_guard_error(event: &str, guard: &GuardError) -> IngestionError {
    IngestionError::Transition(format!("{event}: {guard:?}"))
}

#[cfg(test)]
mod tests;
