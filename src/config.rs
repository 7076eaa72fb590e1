//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable of a run. All fields have defaults
//! matching the Sleep-EDF setup (two EEG derivations, 30 s epochs), so a
//! TOML file only needs to list what it changes:
//!
//! ```toml
//! skip_invalid = false
//!
//! [cache]
//! persist_features = true
//! features_path = "out/features.csv"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::framer::EPOCH_SECONDS;

/// A channel to extract, and the column prefix its features get.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelSpec {
    pub label: String,
    pub prefix: String,
}

impl ChannelSpec {
    pub fn new(label: &str, prefix: &str) -> Self {
        Self {
            label: label.to_string(),
            prefix: prefix.to_string(),
        }
    }
}

/// What to do with an epoch whose total spectral power is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Keep the row with all ratios set to 0.
    #[default]
    Zero,
    /// Fail the recording with `Error::DegenerateSignal`.
    Reject,
}

/// Persist / reuse toggles for the two output tables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub features_path: PathBuf,
    pub labelled_path: PathBuf,
    pub persist_features: bool,
    pub persist_labelled: bool,
    /// Read the feature table from `features_path` instead of recomputing.
    pub load_features: bool,
    /// Read the labelled table from `labelled_path` instead of joining.
    pub load_labelled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            features_path: PathBuf::from("all_epochs_power_bands.csv"),
            labelled_path: PathBuf::from("labelled_epochs_power_bands.csv"),
            persist_features: false,
            persist_labelled: false,
            load_features: false,
            load_labelled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub epoch_seconds: f64,
    pub channels: Vec<ChannelSpec>,
    pub degenerate_policy: DegeneratePolicy,
    /// Log and skip files that fail instead of aborting the batch.
    pub skip_invalid: bool,
    pub cache: CacheConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epoch_seconds: EPOCH_SECONDS,
            channels: vec![
                ChannelSpec::new("EEG Fpz-Cz", "anterior"),
                ChannelSpec::new("EEG Pz-Oz", "posterior"),
            ],
            degenerate_policy: DegeneratePolicy::default(),
            skip_invalid: true,
            cache: CacheConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.epoch_seconds > 0.0) {
            return Err(Error::Config(format!("epoch_seconds must be positive, got {}", self.epoch_seconds)));
        }
        if self.channels.is_empty() {
            return Err(Error::Config("at least one channel is required".to_string()));
        }
        for (i, channel) in self.channels.iter().enumerate() {
            if channel.prefix.is_empty() || channel.prefix.contains(',') {
                return Err(Error::Config(format!("invalid prefix '{}'", channel.prefix)));
            }
            if self.channels[..i].iter().any(|c| c.prefix == channel.prefix) {
                return Err(Error::Config(format!("duplicate prefix '{}'", channel.prefix)));
            }
        }
        Ok(())
    }
}
