use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cascade::{DEFAULT_ACCEPT_THRESHOLD, DEFAULT_EXTERNAL_MIN_CONFIDENCE};
use crate::cache::DEFAULT_LEARN_THRESHOLD;
use crate::error::{Result, TallyError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    #[serde(default = "default_learn_threshold")]
    pub learn_threshold: f64,
    #[serde(default = "default_external_min_confidence")]
    pub external_min_confidence: f64,
    /// Classifier URL; unset means the external tier is skipped.
    #[serde(default)]
    pub external_endpoint: Option<String>,
    /// Name of the environment variable holding the classifier API key.
    #[serde(default = "default_api_key_env")]
    pub external_api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default)]
    pub reporting_period_days: Option<i64>,
    /// Worker threads for batch runs; 0 uses available parallelism.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub taxonomy_path: Option<String>,
    #[serde(default)]
    pub metrics_config_path: Option<String>,
}

fn default_accept_threshold() -> f64 {
    DEFAULT_ACCEPT_THRESHOLD
}

fn default_learn_threshold() -> f64 {
    DEFAULT_LEARN_THRESHOLD
}

fn default_external_min_confidence() -> f64 {
    DEFAULT_EXTERNAL_MIN_CONFIDENCE
}

fn default_api_key_env() -> String {
    "TALLYMAN_CLASSIFIER_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_breaker_threshold() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            accept_threshold: default_accept_threshold(),
            learn_threshold: default_learn_threshold(),
            external_min_confidence: default_external_min_confidence(),
            external_endpoint: None,
            external_api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            breaker_threshold: default_breaker_threshold(),
            reporting_period_days: None,
            workers: 0,
            taxonomy_path: None,
            metrics_config_path: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("accept_threshold", self.accept_threshold),
            ("learn_threshold", self.learn_threshold),
            ("external_min_confidence", self.external_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TallyError::Settings(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        if self.external_min_confidence > self.accept_threshold {
            return Err(TallyError::Settings(
                "external_min_confidence cannot exceed accept_threshold".to_string(),
            ));
        }
        if self.breaker_threshold == 0 {
            return Err(TallyError::Settings("breaker_threshold must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(TallyError::Settings("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_path().join("tallyman.db")
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tallyman")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("tallyman")
}

/// Missing file means defaults; an unreadable or invalid one is an error.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| TallyError::Settings(format!("{}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TallyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/tally", "accept_threshold": 0.9}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.accept_threshold, 0.9);
        assert_eq!(s.learn_threshold, DEFAULT_LEARN_THRESHOLD);
        assert_eq!(s.max_retries, 2);
        assert!(s.external_endpoint.is_none());
        assert_eq!(s.external_api_key_env, "TALLYMAN_CLASSIFIER_KEY");
    }

    #[test]
    fn test_defaults_validate() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert!(!s.data_dir.is_empty());
        assert!(s.worker_count() >= 1);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let s = Settings {
            accept_threshold: 1.4,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(TallyError::Settings(_))));
        let s = Settings {
            external_min_confidence: 0.99,
            accept_threshold: 0.95,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            external_endpoint: Some("http://localhost:9000/classify".to_string()),
            workers: 4,
            ..Settings::default()
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, format!("{json}\n")).unwrap();
        let loaded: Settings = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.workers, 4);
        assert_eq!(loaded.worker_count(), 4);
        assert_eq!(loaded.db_path(), PathBuf::from("/tmp/test/tallyman.db"));
    }

    #[test]
    fn test_shellexpand_tilde() {
        let expanded = shellexpand_path("~/tally");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("tally"));
    }
}
