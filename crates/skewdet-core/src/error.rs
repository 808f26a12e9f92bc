/// Errors raised while building or intersecting oriented polygons.
///
/// Well-formed, finite rectangles never produce these; seeing one means an
/// upstream tensor carried NaN/inf values or a hand-built polygon is not convex.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid polygon: {reason}")]
    InvalidPolygon { reason: &'static str },
}

/// Tensor or batch dimensions that disagree with each other or with the
/// configured model layout.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    Mismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl ShapeError {
    pub(crate) fn check(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::Mismatch {
                what,
                expected,
                actual,
            })
        }
    }
}

/// A configuration value outside its valid range.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid {field}: {reason}")]
pub struct InvalidParam {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidParam {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Shorthand for `ShapeError::Mismatch` checks outside this crate.
pub fn ensure_len(what: &'static str, expected: usize, actual: usize) -> Result<(), ShapeError> {
    ShapeError::check(what, expected, actual)
}
