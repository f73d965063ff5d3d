use railspress_editor::AutosaveConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "railspress.config.json";

/// Builder configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root of the JSON file store; in-memory store when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Schema registry document of the installed theme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<PathBuf>,

    /// Context data (option lists for `@source` fields)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<PathBuf>,

    #[serde(default)]
    pub autosave: AutosaveOptions,

    #[serde(default)]
    pub locking: LockingOptions,

    #[serde(default)]
    pub preview: PreviewOptions,

    #[serde(default)]
    pub http: HttpOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutosaveOptions {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockingOptions {
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpOptions {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_max_interval_ms() -> u64 {
    20_000
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_wait_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

fn default_port() -> u16 {
    3030
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_interval_ms: default_max_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for LockingOptions {
    fn default() -> Self {
        Self {
            wait_ms: default_wait_ms(),
        }
    }
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            schema_path: None,
            context_path: None,
            autosave: AutosaveOptions::default(),
            locking: LockingOptions::default(),
            preview: PreviewOptions::default(),
            http: HttpOptions::default(),
        }
    }
}

impl Config {
    /// Load config from a directory; defaults when no config file exists
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.autosave.debounce_ms == 0 {
            anyhow::bail!("autosave.debounceMs must be greater than zero");
        }
        if self.autosave.max_interval_ms < self.autosave.debounce_ms {
            anyhow::bail!(
                "autosave.maxIntervalMs ({}) must not be shorter than autosave.debounceMs ({})",
                self.autosave.max_interval_ms,
                self.autosave.debounce_ms
            );
        }
        if self.preview.channel_capacity == 0 {
            anyhow::bail!("preview.channelCapacity must be greater than zero");
        }
        Ok(())
    }

    pub fn autosave_config(&self) -> AutosaveConfig {
        AutosaveConfig {
            debounce: Duration::from_millis(self.autosave.debounce_ms),
            max_interval: Duration::from_millis(self.autosave.max_interval_ms),
            retry_backoff: Duration::from_millis(self.autosave.retry_backoff_ms),
        }
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.locking.wait_ms)
    }

    /// Resolve a configured path against the config directory
    pub fn resolve_path(dir: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "dataDir": "data",
            "schemaPath": "theme/schema.json",
            "autosave": { "debounceMs": 250 },
            "locking": { "waitMs": 500 },
            "preview": { "enabled": false },
            "http": { "port": 8080 }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("data")));
        assert_eq!(config.autosave.debounce_ms, 250);
        assert_eq!(config.autosave.max_interval_ms, 20_000);
        assert_eq!(config.lock_wait(), Duration::from_millis(500));
        assert!(!config.preview.enabled);
        assert_eq!(config.preview.channel_capacity, 64);
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data_dir.is_none());
        assert_eq!(config.autosave_config(), AutosaveConfig::default());
        assert_eq!(config.http.port, 3030);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_rejects_inverted_intervals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "autosave": { "debounceMs": 5000, "maxIntervalMs": 1000 } }"#,
        )
        .unwrap();

        let err = Config::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("maxIntervalMs"));
    }
}
