//! Dense per-scale tensors indexed by `(batch, anchor, grid_y, grid_x)`.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use crate::ShapeError;

/// Box parameter channels `[tx, ty, tw, th, ta]`.
pub const BOX_CHANNELS: usize = 5;
/// Objectness channel index.
pub const OBJ_CHANNEL: usize = 5;
/// First class channel index.
pub const CLASS_OFFSET: usize = 6;

/// Leading dimensions of a square per-scale feature map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub batch: usize,
    pub anchors: usize,
    pub grid: usize,
}

/// Position of one cell in a [`GridShape`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex {
    pub batch: usize,
    pub anchor: usize,
    pub gy: usize,
    pub gx: usize,
}

impl CellIndex {
    pub const fn new(batch: usize, anchor: usize, gy: usize, gx: usize) -> Self {
        Self {
            batch,
            anchor,
            gy,
            gx,
        }
    }
}

impl GridShape {
    pub const fn new(batch: usize, anchors: usize, grid: usize) -> Self {
        Self {
            batch,
            anchors,
            grid,
        }
    }

    /// Cells in one image (`anchors * grid * grid`).
    #[inline]
    pub fn per_image(&self) -> usize {
        self.anchors * self.grid * self.grid
    }

    /// Total cell count.
    #[inline]
    pub fn cells(&self) -> usize {
        self.batch * self.per_image()
    }

    #[inline]
    pub fn index(&self, c: CellIndex) -> usize {
        debug_assert!(c.batch < self.batch && c.anchor < self.anchors);
        debug_assert!(c.gy < self.grid && c.gx < self.grid);
        ((c.batch * self.anchors + c.anchor) * self.grid + c.gy) * self.grid + c.gx
    }

    pub fn unravel(&self, flat: usize) -> CellIndex {
        let gx = flat % self.grid;
        let rest = flat / self.grid;
        let gy = rest % self.grid;
        let rest = rest / self.grid;
        let anchor = rest % self.anchors;
        let batch = rest / self.anchors;
        CellIndex {
            batch,
            anchor,
            gy,
            gx,
        }
    }
}

/// Dense scalar (or small value) tensor over a [`GridShape`].
#[derive(Clone, Debug, PartialEq)]
pub struct Grid4<T> {
    shape: GridShape,
    data: Vec<T>,
}

impl<T: Clone> Grid4<T> {
    pub fn filled(shape: GridShape, value: T) -> Self {
        Self {
            shape,
            data: vec![value; shape.cells()],
        }
    }
}

impl<T> Grid4<T> {
    pub fn from_vec(shape: GridShape, data: Vec<T>) -> Result<Self, ShapeError> {
        ShapeError::check("grid tensor", shape.cells(), data.len())?;
        Ok(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellIndex, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.shape.unravel(i), v))
    }
}

impl Grid4<bool> {
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

impl<T> Index<CellIndex> for Grid4<T> {
    type Output = T;

    #[inline]
    fn index(&self, c: CellIndex) -> &T {
        &self.data[self.shape.index(c)]
    }
}

impl<T> IndexMut<CellIndex> for Grid4<T> {
    #[inline]
    fn index_mut(&mut self, c: CellIndex) -> &mut T {
        let i = self.shape.index(c);
        &mut self.data[i]
    }
}

/// Raw network head output for one scale.
///
/// Layout `[batch, anchors, grid, grid, 5 + 1 + num_classes]`, channels
/// `[tx, ty, tw, th, ta, tconf, cls_0 .. cls_{C-1}]`, all logits.
#[derive(Clone, Debug, PartialEq)]
pub struct HeadTensor {
    shape: GridShape,
    num_classes: usize,
    data: Vec<f32>,
}

impl HeadTensor {
    pub fn new(shape: GridShape, num_classes: usize, data: Vec<f32>) -> Result<Self, ShapeError> {
        let channels = CLASS_OFFSET + num_classes;
        ShapeError::check("head tensor", shape.cells() * channels, data.len())?;
        Ok(Self {
            shape,
            num_classes,
            data,
        })
    }

    pub fn zeros(shape: GridShape, num_classes: usize) -> Self {
        let channels = CLASS_OFFSET + num_classes;
        Self {
            shape,
            num_classes,
            data: vec![0.0; shape.cells() * channels],
        }
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn channels(&self) -> usize {
        CLASS_OFFSET + self.num_classes
    }

    #[inline]
    pub fn cell(&self, c: CellIndex) -> &[f32] {
        let ch = self.channels();
        let start = self.shape.index(c) * ch;
        &self.data[start..start + ch]
    }

    #[inline]
    pub fn cell_mut(&mut self, c: CellIndex) -> &mut [f32] {
        let ch = self.channels();
        let start = self.shape.index(c) * ch;
        &mut self.data[start..start + ch]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
