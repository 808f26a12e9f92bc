//! Engine configuration and its JSON form.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use skewdet_core::{AnchorConfig, InvalidParam};
use skewdet_loss::LossParams;
use skewdet_nms::NmsParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] InvalidParam),
}

/// Everything the engine needs besides the tensors themselves.
///
/// Missing JSON fields fall back to their defaults, so `{}` is a valid
/// config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Square network input side in pixels.
    pub image_size: u32,
    pub num_classes: usize,
    /// Anchor templates in pixels, one entry per scale, finest first.
    pub anchors: AnchorConfig,
    pub loss: LossParams,
    pub nms: NmsParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_size: 416,
            num_classes: 2,
            anchors: AnchorConfig::default(),
            loss: LossParams::default(),
            nms: NmsParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON config from disk.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_size == 0 {
            return Err(InvalidParam::new("image_size", "must be positive").into());
        }
        if self.num_classes == 0 {
            return Err(InvalidParam::new("num_classes", "must be at least 1").into());
        }
        if self.anchors.scales.is_empty() {
            return Err(InvalidParam::new("anchors", "no scales configured").into());
        }
        for (i, scale) in self.anchors.scales.iter().enumerate() {
            if scale.is_empty() {
                return Err(InvalidParam::new("anchors", format!("scale {i} has no anchors")).into());
            }
            let bad = scale
                .anchors
                .iter()
                .any(|a| !(a.w.is_finite() && a.h.is_finite() && a.w > 0.0 && a.h > 0.0));
            if bad {
                return Err(InvalidParam::new(
                    "anchors",
                    format!("scale {i} has a non-positive or non-finite size"),
                )
                .into());
            }
        }
        self.loss.validate()?;
        self.nms.validate()?;
        Ok(())
    }

    /// Input side as a float, the unit the geometry works in.
    #[inline]
    pub fn image_size_f32(&self) -> f32 {
        self.image_size as f32
    }
}
