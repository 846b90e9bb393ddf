use common::storage::types::repository::ReadmeCacheState;
use tracing::{debug, warn};

use super::services::IngestionServices;
use crate::{error::IngestionError, types::FetchedReadme};

/// Whether `readme` has to be written to the object cache given the recorded state.
///
/// Absent and error states always qualify; a cached README only when its ETag moved.
pub fn needs_update(existing: Option<&ReadmeCacheState>, readme: &FetchedReadme) -> bool {
    existing.and_then(ReadmeCacheState::etag) != Some(readme.etag.as_str())
}

/// Cache state to record for this attempt.
///
/// Performs at most one object-cache write. A failed write is logged and recorded as
/// [`ReadmeCacheState::Error`]; it never fails the candidate.
pub async fn decide(
    services: &dyn IngestionServices,
    owner: &str,
    name: &str,
    existing: Option<ReadmeCacheState>,
    readme: Option<&FetchedReadme>,
) -> Option<ReadmeCacheState> {
    let Some(readme) = readme else {
        return existing;
    };
    if !needs_update(existing.as_ref(), readme) {
        debug!(%owner, %name, etag = %readme.etag, "readme unchanged; keeping cached copy");
        return existing;
    }

    match services.store_readme(owner, name, &readme.html).await {
        Ok(object_location) => Some(ReadmeCacheState::Cached {
            object_location,
            etag: readme.etag.clone(),
        }),
        Err(err) => {
            let err = IngestionError::ReadmeCache(err);
            warn!(%owner, %name, error = %err, "failed to cache readme");
            Some(ReadmeCacheState::Error {
                message: err.to_string(),
            })
        }
    }
}
