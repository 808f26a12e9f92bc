use nalgebra::{Point2, Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

use crate::polygon::ConvexPolygon;
use crate::GeometryError;

/// Side ratio below which a box counts as a line.
const THIN_RATIO: f32 = 1e-6;

/// Rotated rectangle `(cx, cy, w, h, theta)`.
///
/// `theta` is the rotation (radians) of the width edge from the +x axis.
/// Boxes produced by this crate keep it in `(-π/2, π/2]`; inputs outside
/// that range are accepted and behave identically up to the π-periodicity
/// of a rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub theta: f32,
}

impl OrientedBox {
    pub const fn new(cx: f32, cy: f32, w: f32, h: f32, theta: f32) -> Self {
        Self {
            cx,
            cy,
            w,
            h,
            theta,
        }
    }

    /// Axis-aligned box (`theta = 0`).
    pub const fn axis_aligned(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx, cy, w, h, 0.0)
    }

    pub fn from_array(v: [f32; 5]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }

    pub fn to_array(&self) -> [f32; 5] {
        [self.cx, self.cy, self.w, self.h, self.theta]
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.cx, self.cy)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        (self.w * self.h).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }

    /// Zero width or height, or one side negligible next to the other.
    pub fn is_degenerate(&self) -> bool {
        let (w, h) = (self.w.abs(), self.h.abs());
        w <= f32::EPSILON || h <= f32::EPSILON || w.min(h) <= THIN_RATIO * w.max(h)
    }

    /// Corner form `(x1, y1, x2, y2, theta)`, rotation ignored for the extent.
    pub fn to_corner_form(&self) -> [f32; 5] {
        let hw = 0.5 * self.w;
        let hh = 0.5 * self.h;
        [
            self.cx - hw,
            self.cy - hh,
            self.cx + hw,
            self.cy + hh,
            self.theta,
        ]
    }

    /// The four corners `(±w/2, ±h/2)` rotated by `theta` and translated to
    /// the center, in the order (-,-), (+,-), (+,+), (-,+).
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let rot = Rotation2::new(self.theta);
        let c = self.center();
        let hw = 0.5 * self.w;
        let hh = 0.5 * self.h;
        [
            c + rot * Vector2::new(-hw, -hh),
            c + rot * Vector2::new(hw, -hh),
            c + rot * Vector2::new(hw, hh),
            c + rot * Vector2::new(-hw, hh),
        ]
    }

    /// Convex polygon of the box corners.
    ///
    /// Corners are placed in `f64` so thin boxes far from the origin keep
    /// their shape. Only non-finite parameters are an error.
    pub fn polygon(&self) -> Result<ConvexPolygon, GeometryError> {
        if !self.is_finite() {
            return Err(GeometryError::InvalidPolygon {
                reason: "non-finite box parameters",
            });
        }
        let rot = Rotation2::new(self.theta as f64);
        let c = Point2::new(self.cx as f64, self.cy as f64);
        let hw = 0.5 * self.w as f64;
        let hh = 0.5 * self.h as f64;
        Ok(ConvexPolygon::from_rectangle([
            c + rot * Vector2::new(-hw, -hh),
            c + rot * Vector2::new(hw, -hh),
            c + rot * Vector2::new(hw, hh),
            c + rot * Vector2::new(-hw, hh),
        ]))
    }

    /// Same box with `theta` folded into `(-π/2, π/2]`.
    pub fn normalized(&self) -> Self {
        Self {
            theta: normalize_angle(self.theta),
            ..*self
        }
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            cx: self.cx + dx,
            cy: self.cy + dy,
            ..*self
        }
    }

    /// Rigid rotation of the whole box about `origin`.
    pub fn rotated_about(&self, origin: Point2<f32>, angle: f32) -> Self {
        let rot = Rotation2::new(angle);
        let c = origin + rot * (self.center() - origin);
        Self {
            cx: c.x,
            cy: c.y,
            theta: self.theta + angle,
            ..*self
        }
    }

    /// Multiply position and size by `s`; angle is scale-invariant.
    pub fn scaled(&self, s: f32) -> Self {
        Self {
            cx: self.cx * s,
            cy: self.cy * s,
            w: self.w * s,
            h: self.h * s,
            theta: self.theta,
        }
    }

    /// Oriented box from four labelled corners `p1..p4` (clockwise or
    /// counter-clockwise, `p1p2` being the width edge).
    ///
    /// Center is the mean of both diagonal midpoints; the angle averages the
    /// slopes of the two width edges `p1p2` and `p4p3`.
    pub fn from_quad(q: &[Point2<f32>; 4]) -> Self {
        const SLOPE_EPS: f32 = 1e-16;
        let [p1, p2, p3, p4] = *q;
        let cx = ((p1.x + p3.x) / 2.0 + (p2.x + p4.x) / 2.0) / 2.0;
        let cy = ((p1.y + p3.y) / 2.0 + (p2.y + p4.y) / 2.0) / 2.0;
        let w = (p1 - p2).norm();
        let h = (p2 - p3).norm();

        let slope_a = (p2.y - p1.y) / (p2.x - p1.x + SLOPE_EPS);
        let slope_b = (p3.y - p4.y) / (p3.x - p4.x + SLOPE_EPS);
        let mut theta = (0.5 * (slope_a + slope_b)).atan();
        if theta <= -FRAC_PI_2 {
            theta += PI;
        }
        Self::new(cx, cy, w, h, theta)
    }
}

impl From<[f32; 5]> for OrientedBox {
    fn from(v: [f32; 5]) -> Self {
        Self::from_array(v)
    }
}

/// Fold an angle into `(-π/2, π/2]` (a rectangle is π-periodic).
pub fn normalize_angle(theta: f32) -> f32 {
    let mut t = theta % PI;
    if t > FRAC_PI_2 {
        t -= PI;
    } else if t <= -FRAC_PI_2 {
        t += PI;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn normalize_angle_keeps_half_open_range() {
        assert_abs_diff_eq!(normalize_angle(0.3), 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(normalize_angle(-FRAC_PI_2), FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(normalize_angle(FRAC_PI_2), FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(normalize_angle(PI + 0.2), 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(normalize_angle(-PI - 0.2), -0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(normalize_angle(3.0 * FRAC_PI_4), -FRAC_PI_4, epsilon = 1e-6);
    }

    #[test]
    fn corners_of_rotated_box() {
        let b = OrientedBox::new(1.0, 2.0, 4.0, 2.0, FRAC_PI_2);
        let c = b.corners();
        // width edge now points along +y
        assert_abs_diff_eq!(c[0].x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(c[0].y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(c[2].x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(c[2].y, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn corner_form_ignores_rotation() {
        let b = OrientedBox::new(5.0, 5.0, 4.0, 2.0, 0.7);
        assert_eq!(b.to_corner_form(), [3.0, 4.0, 7.0, 6.0, 0.7]);
    }

    #[test]
    fn from_quad_recovers_box() {
        let truth = OrientedBox::new(10.0, -3.0, 6.0, 2.0, 0.4);
        let q = truth.corners();
        let b = OrientedBox::from_quad(&q);
        assert_abs_diff_eq!(b.cx, truth.cx, epsilon = 1e-4);
        assert_abs_diff_eq!(b.cy, truth.cy, epsilon = 1e-4);
        assert_abs_diff_eq!(b.w, truth.w, epsilon = 1e-4);
        assert_abs_diff_eq!(b.h, truth.h, epsilon = 1e-4);
        assert_abs_diff_eq!(b.theta, truth.theta, epsilon = 1e-4);
    }

    #[test]
    fn non_finite_box_has_no_polygon() {
        let b = OrientedBox::new(f32::NAN, 0.0, 1.0, 1.0, 0.0);
        assert!(b.polygon().is_err());
    }

    #[test]
    fn rigid_rotation_moves_center_and_angle() {
        let b = OrientedBox::new(1.0, 0.0, 2.0, 1.0, 0.0);
        let r = b.rotated_about(Point2::origin(), FRAC_PI_2);
        assert_abs_diff_eq!(r.cx, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.cy, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.theta, FRAC_PI_2, epsilon = 1e-6);
    }
}
