use async_trait::async_trait;
use common::{error::AppError, storage::store::StorageManager};

use crate::{
    github::GithubClient,
    types::{FetchedLicense, FetchedMetadata, FetchedReadme},
};

/// External collaborators of a candidate unit: the hosting API and the README object cache.
#[async_trait]
pub trait IngestionServices: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> Result<FetchedMetadata, AppError>;

    async fn fetch_license(&self, url: &str) -> Result<Option<FetchedLicense>, AppError>;

    async fn fetch_readme(&self, url: &str) -> Result<Option<FetchedReadme>, AppError>;

    /// Stores rendered README HTML and returns its object location.
    async fn store_readme(&self, owner: &str, name: &str, html: &str) -> Result<String, AppError>;
}

pub struct DefaultIngestionServices {
    github: GithubClient,
    storage: StorageManager,
}

impl DefaultIngestionServices {
    pub fn new(github: GithubClient, storage: StorageManager) -> Self {
        Self { github, storage }
    }
}

#[async_trait]
impl IngestionServices for DefaultIngestionServices {
    async fn fetch_metadata(&self, url: &str) -> Result<FetchedMetadata, AppError> {
        self.github.fetch_metadata(url).await
    }

    async fn fetch_license(&self, url: &str) -> Result<Option<FetchedLicense>, AppError> {
        self.github.fetch_license(url).await
    }

    async fn fetch_readme(&self, url: &str) -> Result<Option<FetchedReadme>, AppError> {
        self.github.fetch_readme(url).await
    }

    async fn store_readme(&self, owner: &str, name: &str, html: &str) -> Result<String, AppError> {
        Ok(self.storage.put_readme(owner, name, html).await?)
    }
}
