use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::U256;
use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::amount::to_base_units;
use crate::types::SimilarityPolicy;
use crate::{BASE_RPC_URL, BSC_RPC_URL, ETH_RPC_URL};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Chains with known detector defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChainPreset {
    #[default]
    Eth,
    Bsc,
    Base,
    /// Any other EVM chain; `rpc_url` and `[detector]` must be given.
    Custom,
}

impl ChainPreset {
    pub fn label(&self) -> &'static str {
        match self {
            ChainPreset::Eth => "eth",
            ChainPreset::Bsc => "bsc",
            ChainPreset::Base => "base",
            ChainPreset::Custom => "custom",
        }
    }

    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            ChainPreset::Eth => Some(ETH_RPC_URL),
            ChainPreset::Bsc => Some(BSC_RPC_URL),
            ChainPreset::Base => Some(BASE_RPC_URL),
            ChainPreset::Custom => None,
        }
    }

    pub fn default_symbol(&self) -> &'static str {
        match self {
            ChainPreset::Bsc => "BNB",
            _ => "ETH",
        }
    }

    /// Value range and similarity rule each chain was tuned with.
    pub fn default_detector(&self) -> Option<DetectorSettings> {
        let (min, max, epsilon, policy) = match self {
            ChainPreset::Eth => (
                Decimal::new(1, 1),
                Decimal::new(6, 1),
                Decimal::ZERO,
                SimilarityPolicy::CountOnly,
            ),
            ChainPreset::Bsc => (
                Decimal::new(2, 2),
                Decimal::new(25, 3),
                Decimal::new(1, 5),
                SimilarityPolicy::Incremental,
            ),
            ChainPreset::Base => (
                Decimal::new(2, 2),
                Decimal::new(16, 2),
                Decimal::new(1, 3),
                SimilarityPolicy::Retrospective,
            ),
            ChainPreset::Custom => return None,
        };
        Some(DetectorSettings {
            min_value: min,
            max_value: max,
            min_transfer_count: default_min_transfer_count(),
            similarity_epsilon: epsilon,
            policy,
        })
    }
}

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    /// Overrides the chain preset's detector when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorSettings>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// Chain connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub preset: ChainPreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    /// Ticker used in log lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// First block to scan. Defaults to the first block after startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_block: Option<u64>,
    /// Per-request HTTP timeout for RPC calls.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            preset: ChainPreset::default(),
            rpc_url: None,
            symbol: None,
            start_block: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Suspicious-range and repetition rule, in whole-coin units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub min_value: Decimal,
    pub max_value: Decimal,
    #[serde(default = "default_min_transfer_count")]
    pub min_transfer_count: usize,
    #[serde(default)]
    pub similarity_epsilon: Decimal,
    pub policy: SimilarityPolicy,
}

/// Polling and retry timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Where raised alerts are appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_min_transfer_count() -> usize {
    3
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Detector parameters in base units, fixed for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    pub min_value: U256,
    pub max_value: U256,
    pub min_transfer_count: usize,
    pub similarity_epsilon: U256,
    pub policy: SimilarityPolicy,
}

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }
}

impl AppConfig {
    /// Config populated entirely from a chain preset.
    pub fn for_preset(preset: ChainPreset) -> Self {
        Self {
            chain: ChainConfig {
                preset,
                ..ChainConfig::default()
            },
            detector: preset.default_detector(),
            ..Self::default()
        }
    }

    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn chain_label(&self) -> &'static str {
        self.chain.preset.label()
    }

    pub fn symbol(&self) -> &str {
        self.chain
            .symbol
            .as_deref()
            .unwrap_or_else(|| self.chain.preset.default_symbol())
    }

    /// Explicit `[detector]` table, else the preset's.
    pub fn detector_settings(&self) -> Result<DetectorSettings> {
        match &self.detector {
            Some(settings) => Ok(settings.clone()),
            None => self.chain.preset.default_detector().with_context(|| {
                format!(
                    "chain preset '{}' has no default detector; add a [detector] table",
                    self.chain_label()
                )
            }),
        }
    }

    /// Validate detector settings and convert them to base units.
    pub fn detector_config(&self) -> Result<DetectorConfig> {
        let settings = self.detector_settings()?;
        let min_value = to_base_units(settings.min_value).context("invalid detector.min_value")?;
        let max_value = to_base_units(settings.max_value).context("invalid detector.max_value")?;
        let similarity_epsilon = to_base_units(settings.similarity_epsilon)
            .context("invalid detector.similarity_epsilon")?;
        if min_value > max_value {
            bail!(
                "detector.min_value ({}) exceeds detector.max_value ({})",
                settings.min_value,
                settings.max_value
            );
        }
        if settings.min_transfer_count == 0 {
            bail!("detector.min_transfer_count must be at least 1");
        }
        Ok(DetectorConfig {
            min_value,
            max_value,
            min_transfer_count: settings.min_transfer_count,
            similarity_epsilon,
            policy: settings.policy,
        })
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        if self.polling.max_retries == 0 {
            bail!("polling.max_retries must be at least 1");
        }
        Ok(RetryPolicy::new(
            self.polling.max_retries,
            Duration::from_millis(self.polling.retry_delay_ms),
        ))
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        if self.polling.poll_interval_ms == 0 {
            bail!("polling.poll_interval_ms must be positive");
        }
        Ok(Duration::from_millis(self.polling.poll_interval_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.chain.request_timeout_ms)
    }

    /// Configured RPC URL, falling back to the preset's public endpoint.
    pub fn rpc_url(&self) -> Result<Url> {
        if let Some(url) = &self.chain.rpc_url {
            return Ok(url.clone());
        }
        let fallback = self.chain.preset.default_rpc_url().with_context(|| {
            format!(
                "chain preset '{}' requires chain.rpc_url (or the RPC_URL environment variable)",
                self.chain_label()
            )
        })?;
        Url::parse(fallback).with_context(|| format!("invalid default RPC URL {fallback}"))
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.alerts
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("suspicious_{}.jsonl", self.chain_label())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wei(s: &str) -> U256 {
        s.parse().unwrap()
    }

    // ── presets ────────────────────────────────────────────────────

    #[test]
    fn eth_preset_is_count_only() {
        let cfg = AppConfig::for_preset(ChainPreset::Eth);
        let det = cfg.detector_config().unwrap();
        assert_eq!(det.policy, SimilarityPolicy::CountOnly);
        assert_eq!(det.min_value, wei("100000000000000000"));
        assert_eq!(det.max_value, wei("600000000000000000"));
        assert_eq!(det.min_transfer_count, 3);
    }

    #[test]
    fn bsc_preset_is_incremental() {
        let cfg = AppConfig::for_preset(ChainPreset::Bsc);
        let det = cfg.detector_config().unwrap();
        assert_eq!(det.policy, SimilarityPolicy::Incremental);
        assert_eq!(det.similarity_epsilon, wei("10000000000000"));
        assert_eq!(cfg.symbol(), "BNB");
    }

    #[test]
    fn base_preset_is_retrospective() {
        let cfg = AppConfig::for_preset(ChainPreset::Base);
        let det = cfg.detector_config().unwrap();
        assert_eq!(det.policy, SimilarityPolicy::Retrospective);
        assert_eq!(det.max_value, wei("160000000000000000"));
        assert_eq!(det.similarity_epsilon, wei("1000000000000000"));
    }

    #[test]
    fn custom_preset_requires_detector_and_url() {
        let cfg = AppConfig::for_preset(ChainPreset::Custom);
        assert!(cfg.detector_config().is_err());
        assert!(cfg.rpc_url().is_err());
    }

    // ── parsing ────────────────────────────────────────────────────

    #[test]
    fn parse_minimal_uses_defaults() {
        let cfg: AppConfig = toml::from_str("[chain]\npreset = \"bsc\"\n").unwrap();
        assert_eq!(cfg.chain.preset, ChainPreset::Bsc);
        assert_eq!(cfg.polling.poll_interval_ms, 15_000);
        assert_eq!(cfg.polling.max_retries, 3);
        assert_eq!(cfg.polling.retry_delay_ms, 1_000);
        assert_eq!(cfg.chain.request_timeout_ms, 10_000);
        assert_eq!(cfg.alerts_path(), PathBuf::from("suspicious_bsc.jsonl"));
        assert_eq!(cfg.rpc_url().unwrap().as_str(), BSC_RPC_URL);
    }

    #[test]
    fn parse_full_config() {
        let raw = r#"
            [chain]
            preset = "custom"
            rpc_url = "http://localhost:8545"
            symbol = "MATIC"
            start_block = 100

            [detector]
            min_value = "0.02"
            max_value = "0.03"
            min_transfer_count = 5
            similarity_epsilon = "0.0005"
            policy = "incremental"

            [polling]
            poll_interval_ms = 2000
            max_retries = 5
            retry_delay_ms = 250

            [alerts]
            path = "alerts.jsonl"
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.symbol(), "MATIC");
        assert_eq!(cfg.chain.start_block, Some(100));
        assert_eq!(cfg.rpc_url().unwrap().as_str(), "http://localhost:8545/");

        let det = cfg.detector_config().unwrap();
        assert_eq!(det.min_transfer_count, 5);
        assert_eq!(det.similarity_epsilon, wei("500000000000000"));
        assert_eq!(det.policy, SimilarityPolicy::Incremental);

        let retry = cfg.retry_policy().unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.retry_delay, Duration::from_millis(250));
        assert_eq!(cfg.poll_interval().unwrap(), Duration::from_secs(2));
        assert_eq!(cfg.alerts_path(), PathBuf::from("alerts.jsonl"));
    }

    #[test]
    fn detector_table_overrides_preset() {
        let raw = r#"
            [chain]
            preset = "eth"

            [detector]
            min_value = "1"
            max_value = "2"
            policy = "retrospective"
        "#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();
        let det = cfg.detector_config().unwrap();
        assert_eq!(det.policy, SimilarityPolicy::Retrospective);
        assert_eq!(det.min_value, wei("1000000000000000000"));
        assert_eq!(det.similarity_epsilon, U256::ZERO);
    }

    // ── validation ─────────────────────────────────────────────────

    #[test]
    fn rejects_inverted_range() {
        let mut cfg = AppConfig::for_preset(ChainPreset::Eth);
        if let Some(det) = cfg.detector.as_mut() {
            det.min_value = dec!(1.0);
            det.max_value = dec!(0.5);
        }
        assert!(cfg.detector_config().is_err());
    }

    #[test]
    fn rejects_zero_count() {
        let mut cfg = AppConfig::for_preset(ChainPreset::Eth);
        if let Some(det) = cfg.detector.as_mut() {
            det.min_transfer_count = 0;
        }
        assert!(cfg.detector_config().is_err());
    }

    #[test]
    fn rejects_zero_retries_and_interval() {
        let mut cfg = AppConfig::for_preset(ChainPreset::Eth);
        cfg.polling.max_retries = 0;
        cfg.polling.poll_interval_ms = 0;
        assert!(cfg.retry_policy().is_err());
        assert!(cfg.poll_interval().is_err());
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let mut cfg = AppConfig::for_preset(ChainPreset::Eth);
        if let Some(det) = cfg.detector.as_mut() {
            det.min_value = dec!(0.5);
            det.max_value = dec!(0.5);
        }
        let det = cfg.detector_config().unwrap();
        assert_eq!(det.min_value, det.max_value);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = AppConfig::for_preset(ChainPreset::Base);
        cfg.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.chain.preset, ChainPreset::Base);
        assert_eq!(loaded.detector, cfg.detector);
    }
}
