use serde::{Deserialize, Serialize};

/// Anchor template in image pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub w: f32,
    pub h: f32,
    pub theta: f32,
}

impl Anchor {
    pub const fn new(w: f32, h: f32, theta: f32) -> Self {
        Self { w, h, theta }
    }

    /// Width/height divided by the scale stride; angle unchanged.
    pub fn to_grid(&self, stride: f32) -> Self {
        Self {
            w: self.w / stride,
            h: self.h / stride,
            theta: self.theta,
        }
    }
}

/// Anchors of one detection scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleAnchors {
    pub anchors: Vec<Anchor>,
}

impl ScaleAnchors {
    pub fn new(anchors: Vec<Anchor>) -> Self {
        Self { anchors }
    }

    /// Cartesian product of base sizes and angles, sizes outermost.
    pub fn from_sizes_and_angles(sizes: &[(f32, f32)], angles: &[f32]) -> Self {
        let anchors = sizes
            .iter()
            .flat_map(|&(w, h)| angles.iter().map(move |&a| Anchor::new(w, h, a)))
            .collect();
        Self { anchors }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Anchors expressed in grid-cell units for a `grid`×`grid` map of an
    /// `image_size` input.
    pub fn in_grid_units(&self, image_size: f32, grid: usize) -> Vec<Anchor> {
        let stride = image_size / grid as f32;
        self.anchors.iter().map(|a| a.to_grid(stride)).collect()
    }
}

/// Anchor templates for every scale, finest (largest grid) first.
///
/// Loaded once per model and shared read-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub scales: Vec<ScaleAnchors>,
}

/// Rotations shared by the default anchors: -60°, -30°, 0°, 30°, 60°, 90°.
pub const DEFAULT_ANCHOR_ANGLES_DEG: [f32; 6] = [-60.0, -30.0, 0.0, 30.0, 60.0, 90.0];

const DEFAULT_ANCHOR_SIZES: [[(f32, f32); 3]; 3] = [
    [(12.0, 16.0), (19.0, 36.0), (40.0, 28.0)],
    [(36.0, 75.0), (76.0, 55.0), (72.0, 146.0)],
    [(142.0, 110.0), (192.0, 243.0), (459.0, 401.0)],
];

impl Default for AnchorConfig {
    fn default() -> Self {
        let angles: Vec<f32> = DEFAULT_ANCHOR_ANGLES_DEG
            .iter()
            .map(|d| d.to_radians())
            .collect();
        Self {
            scales: DEFAULT_ANCHOR_SIZES
                .iter()
                .map(|sizes| ScaleAnchors::from_sizes_and_angles(sizes, &angles))
                .collect(),
        }
    }
}

impl AnchorConfig {
    pub fn new(scales: Vec<ScaleAnchors>) -> Self {
        Self { scales }
    }

    #[inline]
    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub fn scale(&self, idx: usize) -> Option<&ScaleAnchors> {
        self.scales.get(idx)
    }
}
