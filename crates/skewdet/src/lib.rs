//! Rotated-box detection engine.
//!
//! This crate ties the `skewdet-*` crates together behind one validated
//! configuration:
//! - [`RotatedDetectionEngine::compute_loss`]: raw heads and normalized
//!   ground truths to a [`LossReport`].
//! - [`RotatedDetectionEngine::post_process`]: raw heads to per-image
//!   [`Detection`]s.
//!
//! ## Quickstart
//!
//! ```
//! use skewdet::core::{GridShape, HeadTensor};
//! use skewdet::{EngineConfig, GroundTruth, RotatedDetectionEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = RotatedDetectionEngine::new(EngineConfig::default())?;
//! let cfg = engine.config();
//! let heads: Vec<HeadTensor> = [52, 26, 13]
//!     .into_iter()
//!     .zip(&cfg.anchors.scales)
//!     .map(|(grid, scale)| {
//!         HeadTensor::zeros(GridShape::new(1, scale.len(), grid), cfg.num_classes)
//!     })
//!     .collect();
//!
//! let targets = [GroundTruth::new(0, 1, 0.5, 0.5, 0.2, 0.1, 0.3)];
//! let report = engine.compute_loss(&heads, &targets)?;
//! assert!(report.total.is_finite());
//!
//! // Untrained heads sit at 0.5 objectness, right on the default threshold.
//! let detections = engine.post_process(&heads)?;
//! assert_eq!(detections.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `skewdet::core`: oriented boxes, skew-IoU, anchors, tensors, decoding.
//! - `skewdet::loss`: target assignment, CIoU, composite loss.
//! - `skewdet::nms`: candidate extraction and rotated NMS.

mod config;
mod engine;
mod error;

pub use skewdet_core as core;
pub use skewdet_loss as loss;
pub use skewdet_nms as nms;

pub use config::{ConfigError, EngineConfig};
pub use engine::RotatedDetectionEngine;
pub use error::EngineError;

pub use skewdet_core::{init_with_level, skew_iou, skew_iou_matrix, OrientedBox, LOG_ENV};
pub use skewdet_loss::{GroundTruth, LossParams, LossReport};
pub use skewdet_nms::{Detection, NmsParams};

#[cfg(feature = "tracing")]
pub use skewdet_core::init_tracing;
