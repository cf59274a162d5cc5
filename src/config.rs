//! TOML configuration for the scanning engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::DEFAULT_REGIONS;
use crate::coverage::{DEFAULT_PENDING_LIMIT, DEFAULT_SWEEP_INTERVAL};
use crate::error::Result;
use crate::executor::queue::DEFAULT_MAX_CONCURRENT;
use crate::executor::service::{ExternalScannerConfig, ProviderSpec};
use crate::executor::{DEFAULT_MEMORY_LIMIT_MB, DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT_SECS};

/// Top-level configuration from `cloudward.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Regions to collect from.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Account id stamped on collected resources.
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            account_id: default_account_id(),
        }
    }
}

/// One external engine provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-provider timeout override, seconds.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Whether the external engine runs as part of orchestrated scans.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_engine_bin")]
    pub engine_bin: PathBuf,
    /// Where engine output files are written.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            engine_bin: default_engine_bin(),
            work_dir: default_work_dir(),
            timeout_secs: default_timeout_secs(),
            memory_limit_mb: default_memory_limit_mb(),
            retry_count: default_retry_count(),
            max_concurrent_scans: default_max_concurrent(),
            providers: default_providers(),
        }
    }
}

impl ExecutorConfig {
    pub fn scanner_config(&self) -> ExternalScannerConfig {
        ExternalScannerConfig {
            engine_bin: self.engine_bin.clone(),
            work_dir: self.work_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            memory_limit_mb: self.memory_limit_mb,
            retry_count: self.retry_count,
            providers: self
                .providers
                .iter()
                .map(|p| ProviderSpec {
                    provider: p.name.clone(),
                    args: p.args.clone(),
                    timeout: p.timeout_secs.map(Duration::from_secs),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_pending_limit")]
    pub pending_limit: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            pending_limit: default_pending_limit(),
        }
    }
}

fn default_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
}

fn default_account_id() -> String {
    "unknown".to_string()
}

fn default_engine_bin() -> PathBuf {
    PathBuf::from("cloudsploit-scan")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_memory_limit_mb() -> u64 {
    DEFAULT_MEMORY_LIMIT_MB
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "cloudsploit".to_string(),
        args: Vec::new(),
        timeout_secs: None,
    }]
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}

fn default_pending_limit() -> usize {
    DEFAULT_PENDING_LIMIT
}

impl Config {
    /// Load config from a TOML file. Returns defaults if the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# cloudward configuration

[collector]
# Regions to collect resources from.
regions = ["us-east-1", "eu-west-1"]
# Account id stamped on collected resources.
account_id = "unknown"

[executor]
# Run the external scanner engine as part of every scan.
enabled = false
engine_bin = "cloudsploit-scan"
# Wall clock limit per engine run, seconds.
timeout_secs = 3600
# Kill the engine if its resident set exceeds this many megabytes.
memory_limit_mb = 1024
# Extra attempts after a transient failure.
retry_count = 1
# Engine subprocesses allowed to run at once.
max_concurrent_scans = 2

[[executor.providers]]
name = "cloudsploit"
# args = ["--config", "/etc/cloudsploit/config.js"]
# timeout_secs = 1800

[coverage]
# How often the background sweep looks for unaggregated scans, seconds.
sweep_interval_secs = 120
pending_limit = 100
"#
    }
}
