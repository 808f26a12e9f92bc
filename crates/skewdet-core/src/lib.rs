//! Core geometry for rotated-box detection.
//!
//! This crate is purely geometric and tensor-shaped. It knows nothing about
//! losses or suppression; those live in `skewdet-loss` and `skewdet-nms`.
//!
//! ## Quickstart
//!
//! ```
//! use skewdet_core::{skew_iou, OrientedBox};
//! use std::f32::consts::FRAC_PI_2;
//!
//! let a = OrientedBox::new(0.0, 0.0, 10.0, 10.0, 0.0);
//! let b = OrientedBox::new(0.0, 0.0, 10.0, 10.0, FRAC_PI_2);
//! let iou = skew_iou(&a, &b).unwrap();
//! assert!((iou - 1.0).abs() < 1e-5);
//! ```

mod anchors;
mod decode;
mod error;
mod iou;
mod logger;
mod oriented_box;
mod polygon;
mod tensor;

pub use anchors::{Anchor, AnchorConfig, ScaleAnchors, DEFAULT_ANCHOR_ANGLES_DEG};
pub use decode::{decode_head, sigmoid, CellPrediction, DecodedScale};
pub use error::{ensure_len, GeometryError, InvalidParam, ShapeError};
pub use iou::{
    aa_iou, skew_iou, skew_iou_gated, skew_iou_matrix, skew_iou_matrix_gated, wh_iou,
    AA_PREFILTER_IOU, IOU_EPS,
};
pub use oriented_box::{normalize_angle, OrientedBox};
pub use polygon::{ConvexPolygon, DEGENERATE_AREA};
pub use tensor::{
    CellIndex, Grid4, GridShape, HeadTensor, BOX_CHANNELS, CLASS_OFFSET, OBJ_CHANNEL,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, LOG_ENV};
