//! Rotated non-maximum suppression.
//!
//! [`post_process`] takes decoded predictions of every scale and returns,
//! per image, the detections that survive confidence filtering and
//! same-class suppression. Suppressed boxes are not discarded outright;
//! they pull the kept box toward themselves in proportion to their
//! objectness.
//!
//! ```
//! use skewdet_core::OrientedBox;
//! use skewdet_nms::{rotated_nms, Detection, NmsParams};
//!
//! let a = Detection::new(OrientedBox::new(0.0, 0.0, 10.0, 10.0, 0.0), 0.9, 1.0, 0);
//! let b = Detection::new(OrientedBox::new(0.5, 0.0, 10.0, 10.0, 0.0), 0.3, 1.0, 0);
//! let kept = rotated_nms(&[a, b], &NmsParams::default()).unwrap();
//! assert_eq!(kept.len(), 1);
//! assert!(kept[0].bbox.cx < 0.25);
//! ```

mod detection;
mod error;
mod nms;
mod params;
mod post_process;

pub use detection::Detection;
pub use error::NmsError;
pub use nms::rotated_nms;
pub use params::{CapPolicy, NmsParams};
pub use post_process::{image_candidates, post_process};
