use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default = "default_gather_interval")]
    pub gather_interval_secs: u64,
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,
    /// Unbounded when absent: every check is probed at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    pub webhook_url: Option<String>,
    pub api_port: Option<u16>,
}

fn default_data_dir() -> PathBuf { PathBuf::from(".data") }
fn default_logs_dir() -> PathBuf { PathBuf::from(".logs") }
fn default_gather_interval() -> u64 { 5 }
fn default_rotation_interval() -> u64 { 60 * 60 * 24 }

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            logs_dir: default_logs_dir(),
            gather_interval_secs: default_gather_interval(),
            rotation_interval_secs: default_rotation_interval(),
            max_concurrency: None,
            webhook_url: None,
            api_port: None,
        }
    }
}

impl WorkerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: WorkerConfig = serde_json::from_str(content)
            .context("Failed to parse config")?;
        anyhow::ensure!(config.gather_interval_secs > 0, "gather_interval_secs must be positive");
        anyhow::ensure!(config.rotation_interval_secs > 0, "rotation_interval_secs must be positive");
        anyhow::ensure!(config.max_concurrency != Some(0), "max_concurrency must be positive when set");
        Ok(config)
    }

    pub fn gather_interval(&self) -> Duration {
        Duration::from_secs(self.gather_interval_secs)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }
}
