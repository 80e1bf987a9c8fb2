//! Platform configuration file.

use anyhow::{Context, Result};
use bootcamp_enrollment::EnrollmentConfig;
use bootcamp_progress::ProgressConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Settings for every service the CLI drives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Enrollment and cohort placement
    pub enrollment: EnrollmentConfig,
    /// Progress tracking
    pub progress: ProgressConfig,
}

impl PlatformConfig {
    /// Load `<data_dir>/config.json`, or defaults when there is none.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("invalid config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootcamp_enrollment::IntakePolicy;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlatformConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.enrollment.max_enrollments, 2);
        assert_eq!(config.progress.pass_threshold, 70);
    }

    #[tokio::test]
    async fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "enrollment": { "cohort_capacity": 25, "intake": { "kind": "next_weekday", "weekday": "Mon" } },
                "progress": { "require_subscription": false }
            }"#,
        )
        .await
        .unwrap();

        let config = PlatformConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.enrollment.cohort_capacity, Some(25));
        assert_eq!(
            config.enrollment.intake,
            IntakePolicy::NextWeekday { weekday: chrono::Weekday::Mon }
        );
        assert!(!config.progress.require_subscription);
        assert_eq!(config.progress.pass_threshold, 70);
    }

    #[tokio::test]
    async fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(CONFIG_FILE), "{ nope").await.unwrap();
        assert!(PlatformConfig::load(dir.path()).await.is_err());
    }
}
