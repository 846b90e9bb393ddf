use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::storage::{
    db::SurrealDbClient,
    types::{package::Package, repository::Repository},
};
use tracing::debug;

use crate::error::IngestionError;

/// Which packages a run processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSelection {
    /// Exactly this package, whatever its status.
    Id(String),
    /// Up to this many eligible packages, stalest first.
    Limit(usize),
}

impl Default for CandidateSelection {
    fn default() -> Self {
        CandidateSelection::Limit(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub package: Package,
    /// Previously ingested record, if any.
    pub repository: Option<Repository>,
}

pub async fn fetch_candidates(
    db: &SurrealDbClient,
    selection: &CandidateSelection,
    stale_before: DateTime<Utc>,
) -> Result<Vec<Candidate>, IngestionError> {
    match selection {
        CandidateSelection::Id(id) => {
            let package = db
                .get_item::<Package>(id)
                .await
                .map_err(|err| IngestionError::Selection(err.into()))?
                .ok_or_else(|| IngestionError::NotFound(id.clone()))?;
            let repository = Repository::get_for_package(db, &package.id)
                .await
                .map_err(IngestionError::Selection)?;

            Ok(vec![Candidate {
                package,
                repository,
            }])
        }
        CandidateSelection::Limit(limit) => {
            let packages = Package::fetch_eligible(db, *limit, stale_before)
                .await
                .map_err(IngestionError::Selection)?;
            let ids = packages.iter().map(|package| package.id.clone()).collect();
            let mut repositories: HashMap<String, Repository> =
                Repository::get_for_packages(db, ids)
                    .await
                    .map_err(IngestionError::Selection)?
                    .into_iter()
                    .map(|repository| (repository.package_id.clone(), repository))
                    .collect();

            debug!(
                limit,
                selected = packages.len(),
                with_repository = repositories.len(),
                "selected ingestion candidates"
            );

            Ok(packages
                .into_iter()
                .map(|package| {
                    let repository = repositories.remove(&package.id);
                    Candidate {
                        package,
                        repository,
                    }
                })
                .collect())
        }
    }
}
