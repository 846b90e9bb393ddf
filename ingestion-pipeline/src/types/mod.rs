//! What the hosting API hands back for one repository, before it is merged into storage.

use chrono::{DateTime, Utc};
use common::storage::types::repository::Release;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedMetadata {
    /// `None` when the host answered but the repository is gone or private.
    pub repository: Option<RepositoryMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryMetadata {
    pub name: String,
    pub owner: String,
    pub owner_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub summary: Option<String>,
    pub homepage_url: Option<String>,
    pub default_branch: Option<String>,
    pub forks: u32,
    pub stars: u32,
    pub is_archived: bool,
    pub is_in_organization: bool,
    pub open_issues: u32,
    pub open_pull_requests: u32,
    pub last_issue_closed_at: Option<DateTime<Utc>>,
    pub last_pull_request_closed_at: Option<DateTime<Utc>>,
    pub topics: Vec<String>,
    pub releases: Vec<FetchedRelease>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_draft: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl From<&FetchedRelease> for Release {
    fn from(release: &FetchedRelease) -> Self {
        Release {
            tag_name: release.tag_name.clone(),
            name: release.name.clone(),
            description: release.description.clone(),
            is_draft: release.is_draft,
            published_at: release.published_at,
            url: release.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedLicense {
    pub spdx_id: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedReadme {
    /// README rendered to HTML by the host.
    pub html: String,
    pub html_url: String,
    /// Content fingerprint; changes whenever the README does.
    pub etag: String,
}
