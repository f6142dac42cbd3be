//! Configuration management
//!
//! Layers built-in defaults, an optional TOML file and `FUNDING__*`
//! environment overrides. Every section has serde defaults so an empty file
//! is a valid configuration.

use crate::error::Result;
use crate::ml::gbm::GbmParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub accuracy: AccuracyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Venue API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_info_url")]
    pub info_url: String,
    #[serde(default = "default_coin")]
    pub coin: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Days of history fetched for training
    #[serde(default = "default_history_days")]
    pub history_days: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Venue key inside the predicted-fundings payload
    #[serde(default = "default_venue")]
    pub venue: String,
}

fn default_info_url() -> String {
    "https://api.hyperliquid.xyz/info".to_string()
}
fn default_coin() -> String {
    "HYPE".to_string()
}
fn default_interval() -> String {
    "1h".to_string()
}
fn default_history_days() -> i64 {
    180
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_pages() -> usize {
    1000
}
fn default_page_delay_ms() -> u64 {
    50
}
fn default_venue() -> String {
    "HlPerp".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            info_url: default_info_url(),
            coin: default_coin(),
            interval: default_interval(),
            history_days: default_history_days(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
            page_delay_ms: default_page_delay_ms(),
            venue: default_venue(),
        }
    }
}

/// Data and model directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_models_dir() -> String {
    "models".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
        }
    }
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        expand(&self.data_dir)
    }

    pub fn models_dir(&self) -> PathBuf {
        expand(&self.models_dir)
    }

    pub fn funding_csv(&self, coin: &str) -> PathBuf {
        self.data_dir().join(format!("{}_funding.csv", coin.to_lowercase()))
    }

    pub fn candles_csv(&self, coin: &str, interval: &str) -> PathBuf {
        self.data_dir()
            .join(format!("{}_candles_{}.csv", coin.to_lowercase(), interval))
    }

    pub fn merged_csv(&self, coin: &str) -> PathBuf {
        self.data_dir().join(format!("{}_merged.csv", coin.to_lowercase()))
    }

    pub fn model_file(&self, coin: &str) -> PathBuf {
        self.models_dir()
            .join(format!("{}_funding_model.json", coin.to_lowercase()))
    }

    pub fn model_meta(&self, coin: &str) -> PathBuf {
        self.models_dir()
            .join(format!("{}_funding_model_meta.json", coin.to_lowercase()))
    }

    pub fn cls_model_file(&self, coin: &str) -> PathBuf {
        self.models_dir()
            .join(format!("{}_funding_cls_model.json", coin.to_lowercase()))
    }

    pub fn cls_model_meta(&self, coin: &str) -> PathBuf {
        self.models_dir()
            .join(format!("{}_funding_cls_model_meta.json", coin.to_lowercase()))
    }

    pub fn predictions_log(&self) -> PathBuf {
        self.data_dir().join("predictions_log.csv")
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Cross-validation and model hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    /// Fit folds on the rayon pool
    #[serde(default = "default_true")]
    pub parallel_folds: bool,
    #[serde(default = "GbmParams::regression_defaults")]
    pub regressor: GbmParams,
    #[serde(default = "GbmParams::classification_defaults")]
    pub classifier: GbmParams,
}

fn default_n_splits() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_splits: default_n_splits(),
            parallel_folds: true,
            regressor: GbmParams::regression_defaults(),
            classifier: GbmParams::classification_defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Trailing window of raw data used to rebuild the latest feature row
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_lookback_days() -> i64 {
    14
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Log entries returned by the history view
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_window_days() -> i64 {
    14
}
fn default_history_limit() -> usize {
    200
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            history_limit: default_history_limit(),
        }
    }
}

/// Policy for sanitising the venue's advertised next funding time.
///
/// These are display heuristics tuned for hourly funding, not venue guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: i64,
    /// How late a reported time may be before it is rolled forward
    #[serde(default = "default_stale_grace_ms")]
    pub stale_grace_ms: i64,
    /// How far ahead a reported time may be before it is clamped
    #[serde(default = "default_max_lead_ms")]
    pub max_lead_ms: i64,
}

fn default_interval_ms() -> i64 {
    60 * 60 * 1000
}
fn default_stale_grace_ms() -> i64 {
    5 * 60 * 1000
}
fn default_max_lead_ms() -> i64 {
    3 * 60 * 60 * 1000
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            stale_grace_ms: default_stale_grace_ms(),
            max_lead_ms: default_max_lead_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from file (if present) and environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = config::Config::builder();
        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("FUNDING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
