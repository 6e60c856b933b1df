use super::{project_local, rot90, Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// An oriented rectangle in world space, described by its centre,
/// a unit vector along its length, and its half extents.
#[derive(Clone, Copy, Debug)]
pub struct Rect {
    /// The centre of the rectangle.
    centre: Point2d,
    /// A unit vector along the length of the rectangle.
    axis: Vector2d,
    /// Half the length of the rectangle, along `axis`.
    half_len: f64,
    /// Half the width of the rectangle, perpendicular to `axis`.
    half_wid: f64,
}

impl Rect {
    /// Creates an axis-aligned rectangle from its minimum corner and extents.
    pub fn axis_aligned(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            centre: Point2d::new(x + 0.5 * width, y + 0.5 * height),
            axis: Vector2d::new(1.0, 0.0),
            half_len: 0.5 * width,
            half_wid: 0.5 * height,
        }
    }

    /// Creates an oriented rectangle.
    ///
    /// # Parameters
    /// * `centre` - The centre of the rectangle
    /// * `axis` - A unit vector along the length of the rectangle
    /// * `half_len` - Half the length, along `axis`
    /// * `half_wid` - Half the width, perpendicular to `axis`
    pub fn oriented(centre: Point2d, axis: Vector2d, half_len: f64, half_wid: f64) -> Self {
        Self {
            centre,
            axis,
            half_len,
            half_wid,
        }
    }

    /// The centre of the rectangle.
    pub fn centre(&self) -> Point2d {
        self.centre
    }

    /// The four corners of the rectangle.
    pub fn corners(&self) -> [Point2d; 4] {
        let along = self.half_len * self.axis;
        let across = self.half_wid * rot90(self.axis);
        [
            self.centre + along + across,
            self.centre + along - across,
            self.centre - along - across,
            self.centre - along + across,
        ]
    }

    /// Projects the rectangle onto the given axis.
    fn project(&self, axis: Vector2d) -> Interval<f64> {
        Interval::hull(self.corners().map(|c| axis.dot(c.to_vec())))
    }

    /// Returns true if this rectangle intersects the other.
    ///
    /// Uses a separating axis test over the face normals of both
    /// rectangles; touching edges do not count as an intersection.
    pub fn intersects(&self, other: &Rect) -> bool {
        [self.axis, rot90(self.axis), other.axis, rot90(other.axis)]
            .iter()
            .all(|axis| self.project(*axis).overlaps(&other.project(*axis)))
    }

    /// Returns true if the rectangle contains the given point.
    pub fn contains(&self, point: Point2d) -> bool {
        let local = project_local(point, self.centre, self.axis, rot90(self.axis));
        local.x.abs() <= self.half_len && local.y.abs() <= self.half_wid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn corners_span_the_extents() {
        let axis = Vector2d::new(std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
        let r = Rect::oriented(Point2d::new(1.0, 2.0), axis, 2.0, 1.0);
        let span = r.project(axis);
        assert_approx_eq!(span.length(), 4.0);
        assert_approx_eq!(span.min + 0.5 * span.length(), axis.dot(r.centre().to_vec()));
    }

    #[test]
    fn overlapping_axis_aligned() {
        let a = Rect::axis_aligned(0.0, 0.0, 10.0, 4.0);
        let b = Rect::axis_aligned(8.0, 2.0, 10.0, 4.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn disjoint_axis_aligned() {
        let a = Rect::axis_aligned(0.0, 0.0, 10.0, 4.0);
        let b = Rect::axis_aligned(11.0, 0.0, 2.0, 2.0);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn rotated_near_miss() {
        // A diamond whose bounding box overlaps `b` but whose area does not.
        let axis = Vector2d::new(std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
        let a = Rect::oriented(Point2d::new(0.0, 0.0), axis, 2.0, 0.1);
        let b = Rect::axis_aligned(1.5, -1.6, 1.0, 1.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn rotated_hit() {
        let axis = Vector2d::new(std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2);
        let a = Rect::oriented(Point2d::new(0.0, 0.0), axis, 2.0, 0.5);
        let b = Rect::axis_aligned(0.5, 0.5, 1.0, 1.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn contains_point() {
        let r = Rect::axis_aligned(-2.0, -10.0, 4.0, 6.0);
        assert!(r.contains(Point2d::new(0.0, -5.0)));
        assert!(!r.contains(Point2d::new(0.0, -3.0)));
    }
}
