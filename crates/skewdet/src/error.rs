use skewdet_core::ShapeError;
use skewdet_loss::LossError;
use skewdet_nms::NmsError;

use crate::ConfigError;

/// Errors returned by [`crate::RotatedDetectionEngine`].
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Loss(#[from] LossError),
    #[error(transparent)]
    Nms(#[from] NmsError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}
