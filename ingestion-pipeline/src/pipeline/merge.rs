use std::collections::BTreeSet;

use chrono::Utc;
use common::storage::types::repository::{License, ReadmeCacheState, Release, Repository};

use crate::{
    error::IngestionError,
    types::{FetchedLicense, FetchedMetadata, FetchedReadme},
};

/// Lower-cased, de-duplicated and sorted keywords.
pub fn normalize_keywords<I, S>(topics: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    topics
        .into_iter()
        .map(|topic| topic.as_ref().trim().to_lowercase())
        .filter(|topic| !topic.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Overwrites every field of `existing` from this attempt's fetch results.
///
/// When nothing differs from what is stored the record comes back untouched, so
/// ingesting the same metadata twice yields an identical record.
pub fn merge(
    existing: Repository,
    metadata: &FetchedMetadata,
    license: Option<&FetchedLicense>,
    readme: Option<&FetchedReadme>,
    readme_cache: Option<ReadmeCacheState>,
) -> Result<Repository, IngestionError> {
    let remote = metadata
        .repository
        .as_ref()
        .ok_or_else(|| IngestionError::MissingRepositoryMetadata(existing.package_id.clone()))?;

    let merged = Repository {
        default_branch: non_empty(remote.default_branch.as_deref()),
        forks: remote.forks,
        homepage_url: non_empty(remote.homepage_url.as_deref()),
        is_archived: remote.is_archived,
        is_in_organization: remote.is_in_organization,
        keywords: normalize_keywords(&remote.topics),
        last_issue_closed_at: remote.last_issue_closed_at,
        last_pull_request_closed_at: remote.last_pull_request_closed_at,
        license: license
            .and_then(|license| license.spdx_id.as_deref())
            .map_or(License::None, License::from_spdx),
        license_url: non_empty(license.and_then(|license| license.html_url.as_deref())),
        name: non_empty(Some(&remote.name)),
        open_issues: remote.open_issues,
        open_pull_requests: remote.open_pull_requests,
        owner: non_empty(Some(&remote.owner)),
        owner_name: non_empty(remote.owner_name.as_deref()),
        owner_avatar_url: non_empty(remote.owner_avatar_url.as_deref()),
        readme_cache,
        readme_html_url: non_empty(readme.map(|readme| readme.html_url.as_str())),
        releases: remote.releases.iter().map(Release::from).collect(),
        stars: remote.stars,
        summary: non_empty(remote.summary.as_deref()),
        ..existing.clone()
    };

    if merged == existing {
        return Ok(existing);
    }

    Ok(Repository {
        updated_at: Utc::now(),
        ..merged
    })
}
