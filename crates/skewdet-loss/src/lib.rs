//! Target assignment and the composite rotated-box loss.
//!
//! - [`build_targets`]: ground truths to dense per-scale targets.
//! - [`bbox_xywha_ciou`]: CIoU with an angular quality factor.
//! - [`compute_loss`]: regression, confidence and classification terms
//!   summed over scales, with [`AssignmentMetrics`] diagnostics.
//!
//! Values documented as constant weights (CIoU `alpha`, the regression
//! weight) are plain numbers here; [`RegressionTerm`] exposes them per cell.

mod aggregate;
mod assign;
mod ciou;
mod error;
pub mod functional;
mod metrics;
mod params;

pub use aggregate::{compute_loss, scale_loss, LossReport, RegressionTerm, ScaleLoss};
pub use assign::{build_targets, AssignmentResult, GroundTruth, MatchedCell};
pub use ciou::{bbox_xywha_ciou, ciou_terms, CiouTerms};
pub use error::LossError;
pub use metrics::AssignmentMetrics;
pub use params::{FocalParams, LossParams, Reduction};
