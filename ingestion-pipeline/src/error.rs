use common::{error::AppError, storage::types::package::PackageStatus};
use thiserror::Error;

/// Failures of an ingestion run or of a single candidate within it.
///
/// Only [`IngestionError::NotFound`] and [`IngestionError::Selection`] ever reach the
/// caller of a run; everything else is recorded against the candidate it happened to.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Package not found: {0}")]
    NotFound(String),
    #[error("Candidate selection failed: {0}")]
    Selection(#[source] AppError),
    #[error("Metadata request failed: {0}")]
    MetadataFetch(#[source] AppError),
    #[error("No repository metadata returned for {0}")]
    MissingRepositoryMetadata(String),
    #[error("README cache write failed: {0}")]
    ReadmeCache(#[source] AppError),
    #[error("Persisting repository failed: {0}")]
    Persistence(#[source] AppError),
    #[error("Metrics push failed: {0}")]
    MetricsPush(#[source] AppError),
    #[error("Ingestion task aborted: {0}")]
    TaskAborted(String),
    #[error("Invalid candidate transition: {0}")]
    Transition(String),
}

impl IngestionError {
    /// Status recorded on the package when its attempt ends with this error.
    pub fn package_status(&self) -> PackageStatus {
        match self {
            IngestionError::MetadataFetch(_) => PackageStatus::MetadataRequestFailed,
            IngestionError::MissingRepositoryMetadata(_) | IngestionError::NotFound(_) => {
                PackageStatus::NotFound
            }
            IngestionError::Selection(_)
            | IngestionError::ReadmeCache(_)
            | IngestionError::Persistence(_)
            | IngestionError::MetricsPush(_)
            | IngestionError::TaskAborted(_)
            | IngestionError::Transition(_) => PackageStatus::IngestionFailed,
        }
    }
}
