use skewdet_core::{GeometryError, ShapeError};

/// Errors returned by post-processing.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NmsError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
