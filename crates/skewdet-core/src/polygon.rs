//! Convex polygons and exact convex–convex intersection.
//!
//! Vertices are stored counter-clockwise in `f64`; oriented boxes are built
//! in `f32` but clipping thin slivers in single precision loses too much area.

use nalgebra::{Point2, Vector2};
use std::f64::consts::TAU;

use crate::GeometryError;

/// Relative tolerance for the convexity test, scaled by the squared extent.
const CONVEXITY_TOL: f64 = 1e-9;
/// Areas below this are treated as degenerate.
pub const DEGENERATE_AREA: f64 = 1e-12;

/// Simple convex polygon with counter-clockwise vertex order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConvexPolygon {
    vertices: Vec<Point2<f64>>,
}

#[inline]
fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn signed_area(pts: &[Point2<f64>]) -> f64 {
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let p = pts[i];
        let q = pts[(i + 1) % n];
        acc += p.x * q.y - q.x * p.y;
    }
    0.5 * acc
}

impl ConvexPolygon {
    /// Validate and orient a vertex ring.
    ///
    /// Fewer than three vertices, or collinear vertices, give a valid but
    /// degenerate (zero-area) polygon. Non-finite coordinates, reflex
    /// vertices and self-intersecting rings are rejected.
    pub fn new(mut vertices: Vec<Point2<f64>>) -> Result<Self, GeometryError> {
        if vertices
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(GeometryError::InvalidPolygon {
                reason: "non-finite vertex",
            });
        }
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }
        let poly = Self { vertices };
        poly.check_convex()?;
        Ok(poly)
    }

    /// Rectangle corners in ring order. A rectangle is convex by
    /// construction, so only the orientation is fixed up.
    pub(crate) fn from_rectangle(corners: [Point2<f64>; 4]) -> Self {
        let mut vertices = corners.to_vec();
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }
        Self { vertices }
    }

    fn check_convex(&self) -> Result<(), GeometryError> {
        let pts = &self.vertices;
        let n = pts.len();
        let extent = pts
            .iter()
            .map(|p| p.coords.norm_squared())
            .fold(0.0_f64, f64::max)
            .max(1.0);
        let tol = CONVEXITY_TOL * extent;

        let mut turning = 0.0;
        let mut left = false;
        let mut right = false;
        for i in 0..n {
            let e0 = pts[(i + 1) % n] - pts[i];
            let e1 = pts[(i + 2) % n] - pts[(i + 1) % n];
            let c = cross(e0, e1);
            left |= c > tol;
            right |= c < -tol;
            if e0.norm_squared() > 0.0 && e1.norm_squared() > 0.0 {
                turning += c.atan2(e0.dot(&e1));
            }
        }

        if left && right {
            return Err(GeometryError::InvalidPolygon {
                reason: "reflex or self-intersecting vertex ring",
            });
        }
        if n < 3 || !left {
            // collinear ring: zero area, nothing to intersect
            return Ok(());
        }
        // A convex ring winds exactly once; star-shaped rings wind 2+ times.
        if (turning - TAU).abs() > 1e-6 {
            return Err(GeometryError::InvalidPolygon {
                reason: "vertex ring winds more than once",
            });
        }
        Ok(())
    }

    #[inline]
    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn area(&self) -> f64 {
        signed_area(&self.vertices).abs()
    }

    pub fn is_degenerate(&self) -> bool {
        self.area() < DEGENERATE_AREA
    }

    /// Point-in-polygon test; boundary points count as inside.
    pub fn contains(&self, p: Point2<f64>) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        (0..n).all(|i| {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            cross(b - a, p - a) >= 0.0
        })
    }

    /// Intersection of two convex polygons (Sutherland–Hodgman, `other` as
    /// the clip window). The result is convex and may be empty.
    pub fn intersection(&self, other: &ConvexPolygon) -> ConvexPolygon {
        if self.is_degenerate() || other.is_degenerate() {
            return ConvexPolygon::default();
        }

        let mut output = self.vertices.clone();
        let clip = &other.vertices;
        let m = clip.len();

        for i in 0..m {
            if output.is_empty() {
                break;
            }
            let a = clip[i];
            let b = clip[(i + 1) % m];
            let edge = b - a;

            let input = std::mem::take(&mut output);
            let k = input.len();
            for j in 0..k {
                let p = input[j];
                let q = input[(j + 1) % k];
                let sp = cross(edge, p - a);
                let sq = cross(edge, q - a);

                if sp >= 0.0 {
                    output.push(p);
                }
                if (sp >= 0.0) != (sq >= 0.0) {
                    let t = sp / (sp - sq);
                    output.push(p + (q - p) * t);
                }
            }
        }

        ConvexPolygon { vertices: output }
    }

    pub fn intersection_area(&self, other: &ConvexPolygon) -> f64 {
        self.intersection(other).area()
    }
}
