use skewdet_core::ShapeError;

/// Errors returned by target assignment and loss computation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LossError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("ground truth #{index}: class {class_id} outside 0..{num_classes}")]
    UnknownClass {
        index: usize,
        class_id: usize,
        num_classes: usize,
    },
    #[error("ground truth #{index}: batch index {batch_index} outside 0..{batch}")]
    BatchIndexOutOfRange {
        index: usize,
        batch_index: usize,
        batch: usize,
    },
    #[error("ground truth #{index} has non-finite or negative coordinates")]
    InvalidTarget { index: usize },
}
