use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::StoredObject},
    stored_object,
};

/// Outcome of the most recent processing attempt for a package.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    #[default]
    New,
    Ok,
    NotFound,
    MetadataRequestFailed,
    IngestionFailed,
}

impl PackageStatus {
    const ALL: [PackageStatus; 5] = [
        PackageStatus::New,
        PackageStatus::Ok,
        PackageStatus::NotFound,
        PackageStatus::MetadataRequestFailed,
        PackageStatus::IngestionFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::New => "new",
            PackageStatus::Ok => "ok",
            PackageStatus::NotFound => "not_found",
            PackageStatus::MetadataRequestFailed => "metadata_request_failed",
            PackageStatus::IngestionFailed => "ingestion_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PackageStatus::NotFound
                | PackageStatus::MetadataRequestFailed
                | PackageStatus::IngestionFailed
        )
    }

    fn failures() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| status.is_failure())
            .map(PackageStatus::as_str)
            .collect()
    }
}

/// The pipeline step that last touched a package.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    #[default]
    Reconciliation,
    Ingestion,
    Analysis,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Reconciliation => "reconciliation",
            ProcessingStage::Ingestion => "ingestion",
            ProcessingStage::Analysis => "analysis",
        }
    }
}

stored_object!(Package, "package", {
    url: String,
    status: PackageStatus,
    processing_stage: ProcessingStage
});

impl Package {
    pub fn new(url: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            url,
            status: PackageStatus::New,
            processing_stage: ProcessingStage::Reconciliation,
        }
    }

    /// Packages due for ingestion, stalest first.
    ///
    /// A package is eligible when reconciliation handed it over, when its last attempt
    /// failed, or when it has not been touched since `stale_before`. Ties on
    /// `updated_at` are broken by id so the batch is deterministic.
    pub async fn fetch_eligible(
        db: &SurrealDbClient,
        limit: usize,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Package>, AppError> {
        const ELIGIBLE_QUERY: &str = r"
            SELECT * FROM type::table($table)
            WHERE processing_stage = $reconciliation
               OR status IN $failure_statuses
               OR updated_at <= $stale_before
            ORDER BY updated_at ASC, id ASC
            LIMIT $limit;
        ";

        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut result = db
            .client
            .query(ELIGIBLE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("reconciliation", ProcessingStage::Reconciliation.as_str()))
            .bind(("failure_statuses", PackageStatus::failures()))
            .bind(("stale_before", SurrealDatetime::from(stale_before)))
            .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
            .await?;

        let packages: Vec<Package> = result.take(0)?;
        Ok(packages)
    }

    /// Records the result of a processing attempt and moves the package to `stage`.
    pub async fn update_status(
        db: &SurrealDbClient,
        id: &str,
        status: PackageStatus,
        stage: ProcessingStage,
    ) -> Result<Package, AppError> {
        const UPDATE_STATUS_QUERY: &str = r"
            UPDATE type::thing($table, $id)
            SET status = $status,
                processing_stage = $stage,
                updated_at = $now
            RETURN AFTER;
        ";

        let mut result = db
            .client
            .query(UPDATE_STATUS_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("status", status.as_str()))
            .bind(("stage", stage.as_str()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<Package> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("package {id}")))
    }
}
