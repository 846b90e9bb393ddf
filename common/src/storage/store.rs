use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{path::Path as ObjPath, ObjectStore};

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

const README_PREFIX: &str = "readme";
const README_FILE_NAME: &str = "readme.html";

/// Object storage used as the README side-cache.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
}

impl StorageManager {
    /// Opens the backend selected by `cfg.storage`.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let store = create_storage_backend(cfg).await?;
        Ok(Self { store })
    }

    /// Wraps an already constructed backend.
    pub fn with_backend(store: DynStore) -> Self {
        Self { store }
    }

    /// Writes a rendered README and returns the location it was stored under.
    ///
    /// Repeated writes for the same repository overwrite the previous object.
    pub async fn put_readme(
        &self,
        owner: &str,
        repository: &str,
        html: &str,
    ) -> object_store::Result<String> {
        let location = readme_location(owner, repository);
        let payload = object_store::PutPayload::from_bytes(Bytes::copy_from_slice(html.as_bytes()));
        self.store
            .put(&ObjPath::from(location.as_str()), payload)
            .await?;
        Ok(location)
    }
}

/// Object key of a repository's README. Owner and name are case-insensitive upstream.
pub fn readme_location(owner: &str, repository: &str) -> String {
    format!(
        "{README_PREFIX}/{}/{}/{README_FILE_NAME}",
        owner.to_lowercase(),
        repository.to_lowercase()
    )
}

async fn create_storage_backend(cfg: &AppConfig) -> object_store::Result<DynStore> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            Ok(Arc::new(LocalFileSystem::new_with_prefix(base)?))
        }
        StorageKind::Memory => Ok(Arc::new(InMemory::new())),
        StorageKind::S3 => {
            let bucket = cfg
                .readme_bucket
                .as_deref()
                .ok_or_else(|| object_store::Error::Generic {
                    store: "S3",
                    source: "readme_bucket must be set for s3 storage".into(),
                })?;
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()?;
            Ok(Arc::new(store))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}
