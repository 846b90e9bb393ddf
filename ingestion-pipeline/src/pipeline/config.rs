use chrono::{DateTime, Utc};
use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    /// Packages untouched for longer than this are picked up again.
    pub reingestion_interval_secs: u64,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            reingestion_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: IngestionTuning {
                reingestion_interval_secs: config.reingestion_interval_secs,
            },
        }
    }

    /// Cut-off below which a package's `updated_at` counts as stale.
    pub fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = i64::try_from(self.tuning.reingestion_interval_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs)
            .and_then(|interval| now.checked_sub_signed(interval))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
