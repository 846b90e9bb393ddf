use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::StoredObject},
    stored_object,
};

/// License families the registry recognises, keyed by SPDX identifier.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum License {
    Agpl3,
    Apache2,
    Bsd2Clause,
    Bsd3Clause,
    Gpl2,
    Gpl3,
    Isc,
    Lgpl21,
    Lgpl3,
    Mit,
    Mpl2,
    Unlicense,
    /// A license was detected but is not one of the above.
    Other,
    #[default]
    None,
}

impl License {
    /// Maps an SPDX id (case-insensitive) onto a known license.
    pub fn from_spdx(spdx_id: &str) -> Self {
        match spdx_id.to_ascii_lowercase().as_str() {
            "agpl-3.0" | "agpl-3.0-only" | "agpl-3.0-or-later" => License::Agpl3,
            "apache-2.0" => License::Apache2,
            "bsd-2-clause" => License::Bsd2Clause,
            "bsd-3-clause" => License::Bsd3Clause,
            "gpl-2.0" | "gpl-2.0-only" | "gpl-2.0-or-later" => License::Gpl2,
            "gpl-3.0" | "gpl-3.0-only" | "gpl-3.0-or-later" => License::Gpl3,
            "isc" => License::Isc,
            "lgpl-2.1" | "lgpl-2.1-only" | "lgpl-2.1-or-later" => License::Lgpl21,
            "lgpl-3.0" | "lgpl-3.0-only" | "lgpl-3.0-or-later" => License::Lgpl3,
            "mit" => License::Mit,
            "mpl-2.0" => License::Mpl2,
            "unlicense" => License::Unlicense,
            "" => License::None,
            _ => License::Other,
        }
    }
}

/// Where the rendered README of a repository lives in the object cache, if anywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadmeCacheState {
    Cached {
        object_location: String,
        etag: String,
    },
    Error {
        message: String,
    },
}

impl ReadmeCacheState {
    pub fn etag(&self) -> Option<&str> {
        match self {
            ReadmeCacheState::Cached { etag, .. } => Some(etag),
            ReadmeCacheState::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_draft: bool,
    #[serde(
        serialize_with = "crate::storage::types::serde_helpers::serialize_option_datetime",
        deserialize_with = "crate::storage::types::serde_helpers::deserialize_option_datetime",
        default
    )]
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

stored_object!(Repository, "repository", {
    package_id: String,
    default_branch: Option<String>,
    forks: u32,
    homepage_url: Option<String>,
    is_archived: bool,
    is_in_organization: bool,
    keywords: Vec<String>,
    #[serde(
        serialize_with = "crate::storage::types::serde_helpers::serialize_option_datetime",
        deserialize_with = "crate::storage::types::serde_helpers::deserialize_option_datetime",
        default
    )]
    last_issue_closed_at: Option<DateTime<Utc>>,
    #[serde(
        serialize_with = "crate::storage::types::serde_helpers::serialize_option_datetime",
        deserialize_with = "crate::storage::types::serde_helpers::deserialize_option_datetime",
        default
    )]
    last_pull_request_closed_at: Option<DateTime<Utc>>,
    license: License,
    license_url: Option<String>,
    name: Option<String>,
    open_issues: u32,
    open_pull_requests: u32,
    owner: Option<String>,
    owner_name: Option<String>,
    owner_avatar_url: Option<String>,
    #[serde(default)]
    readme_cache: Option<ReadmeCacheState>,
    readme_html_url: Option<String>,
    releases: Vec<Release>,
    stars: u32,
    summary: Option<String>
});

impl Repository {
    /// An empty record for a package that has never been ingested.
    ///
    /// The record id is the package id, which keeps the relation one-to-one.
    pub fn new(package_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: package_id.to_string(),
            created_at: now,
            updated_at: now,
            package_id: package_id.to_string(),
            default_branch: None,
            forks: 0,
            homepage_url: None,
            is_archived: false,
            is_in_organization: false,
            keywords: Vec::new(),
            last_issue_closed_at: None,
            last_pull_request_closed_at: None,
            license: License::None,
            license_url: None,
            name: None,
            open_issues: 0,
            open_pull_requests: 0,
            owner: None,
            owner_name: None,
            owner_avatar_url: None,
            readme_cache: None,
            readme_html_url: None,
            releases: Vec::new(),
            stars: 0,
            summary: None,
        }
    }

    pub async fn get_for_package(
        db: &SurrealDbClient,
        package_id: &str,
    ) -> Result<Option<Repository>, AppError> {
        Ok(db.get_item::<Repository>(package_id).await?)
    }

    /// Repositories belonging to any of `package_ids`, in no particular order.
    pub async fn get_for_packages(
        db: &SurrealDbClient,
        package_ids: Vec<String>,
    ) -> Result<Vec<Repository>, AppError> {
        if package_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = db
            .client
            .query("SELECT * FROM type::table($table) WHERE package_id IN $package_ids")
            .bind(("table", Self::table_name()))
            .bind(("package_ids", package_ids))
            .await?;

        let repositories: Vec<Repository> = result.take(0)?;
        Ok(repositories)
    }

    /// Writes the whole record in a single statement, creating it when absent.
    pub async fn upsert(self, db: &SurrealDbClient) -> Result<Repository, AppError> {
        let id = self.id.clone();
        let stored = db.upsert_item(self).await?;
        stored.ok_or_else(|| {
            AppError::InternalError(format!("upsert of repository {id} returned nothing"))
        })
    }
}
