//! Harness and network configuration, optionally loaded from a TOML file.

use std::path::{Path, PathBuf};

use conv_lstm::RecurrentSegmenterConfig;
use serde::{Deserialize, Serialize};

use crate::data::ImageGeometry;
use crate::error::{HarnessError, HarnessResult};

pub const DEFAULT_CONFIG_NAME: &str = "training.toml";
pub const CONFIG_ENV: &str = "TRAINING_CONFIG";

/// Everything the harness needs besides the network topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub height: usize,
    pub width: usize,
    pub depth: usize,
    /// Multiplier on the positive-class loss term.
    pub pos_weight: f64,
    /// Adam learning rate.
    pub rate: f64,
    /// Adam numerical-stability epsilon.
    pub epsilon: f32,
    pub batch_size: usize,
    pub epochs: usize,
    /// Directory receiving `summaries.jsonl`.
    pub log_path: PathBuf,
    /// Seeds parameter init and batch shuffling when set.
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            height: 64,
            width: 64,
            depth: 3,
            pos_weight: 1.0,
            rate: 1e-3,
            epsilon: 1e-8,
            batch_size: 4,
            epochs: 1,
            log_path: PathBuf::from("logs"),
            seed: None,
        }
    }
}

impl HarnessConfig {
    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry::new(self.height, self.width, self.depth)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |msg: &str| Err(HarnessError::InvalidConfig(msg.to_string()));
        if self.height == 0 || self.width == 0 || self.depth == 0 {
            return invalid("image height, width and depth must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return invalid("rate must be a positive finite number");
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return invalid("epsilon must be a positive finite number");
        }
        if !(self.pos_weight.is_finite() && self.pos_weight > 0.0) {
            return invalid("pos_weight must be a positive finite number");
        }
        Ok(())
    }
}

/// Combined file layout: `[harness]` and `[network]` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub harness: HarnessConfig,
    pub network: RecurrentSegmenterConfig,
}

impl TrainingConfig {
    /// Load from `$TRAINING_CONFIG`, else `training.toml` when present, else defaults.
    pub fn load() -> HarnessResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_path(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_NAME);
        if default_path.exists() {
            return Self::from_path(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        let cfg: Self = toml::from_str(&raw).map_err(|source| HarnessError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded training config from {}", path.display());
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let raw = r#"
            [harness]
            height = 16
            width = 12
            depth = 1
            pos_weight = 4.0

            [network]
            steps = 3
        "#;
        let cfg: TrainingConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.harness.geometry(), ImageGeometry::new(16, 12, 1));
        assert_eq!(cfg.harness.pos_weight, 4.0);
        assert_eq!(cfg.harness.batch_size, HarnessConfig::default().batch_size);
        assert_eq!(cfg.network.steps, 3);
        assert_eq!(cfg.network.hidden_channels, 8);
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let cfg = HarnessConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(HarnessError::InvalidConfig(_))));
    }

    #[test]
    fn from_path_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[harness\nheight = ").unwrap();
        let err = TrainingConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Toml { .. }));
    }
}
