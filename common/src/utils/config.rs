use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
    S3,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Bucket holding cached READMEs when `storage = "s3"`.
    #[serde(default)]
    pub readme_bucket: Option<String>,
    /// Base URL of a Prometheus push gateway. Metrics are not pushed when unset.
    #[serde(default)]
    pub metrics_push_url: Option<String>,
    /// Packages not touched for this long become eligible for re-ingestion.
    #[serde(default = "default_reingestion_interval_secs")]
    pub reingestion_interval_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_reingestion_interval_secs() -> u64 {
    60 * 60
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: "registry".to_string(),
            surrealdb_database: "registry".to_string(),
            github_token: None,
            github_api_url: default_github_api_url(),
            storage: default_storage_kind(),
            data_dir: default_data_dir(),
            readme_bucket: None,
            metrics_push_url: None,
            reingestion_interval_secs: default_reingestion_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
