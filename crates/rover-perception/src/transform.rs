//! Geometric transforms between the three frames the rover reasons in.
//!
//! | Frame | Origin | Axes |
//! |-------|--------|------|
//! | image | top-left pixel | `x` right, `y` down |
//! | rover | ground contact point (bottom-centre of the top-down view) | `x` forward, `y` left |
//! | world | grid cell `(0, 0)` | grid columns / rows |
//!
//! The camera image is first warped to a top-down view with a four-point
//! [`Homography`] ([`project_to_groundplane`]).  Member pixels of a mask are
//! then lifted into the rover frame ([`to_rover_frame`]) and finally placed
//! in the world grid ([`to_world_grid`]) by rotating with the vehicle yaw,
//! scaling, translating by the vehicle position and clamping into the grid.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Point2;
//! use rover_perception::transform::{rotate, to_polar};
//!
//! let forward = vec![Point2::new(1.0_f32, 0.0)];
//! let left = rotate(&forward, 90.0);
//! assert!((left[0].y - 1.0).abs() < 1e-5);
//!
//! let polar = to_polar(&left);
//! assert!((polar.distances[0] - 1.0).abs() < 1e-5);
//! ```

use nalgebra::{Matrix3, Point2, SMatrix, SVector};
use rover_types::{Frame, Pose, RoverError};
use serde::{Deserialize, Serialize};

use crate::mask::Mask;

/// Four image-plane points, in correspondence order.
pub type Quad = [Point2<f32>; 4];

/// Smallest triangle area (pixels²) still considered non-degenerate.
const MIN_TRIANGLE_AREA: f64 = 1e-6;

/// Slack allowed when deciding whether a back-projected pixel lies inside
/// the source image.
const EDGE_TOLERANCE: f64 = 1e-6;

// ────────────────────────────────────────────────────────────────────────────
// Value types
// ────────────────────────────────────────────────────────────────────────────

/// A world-grid cell, `x` = column, `y` = row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub x: usize,
    pub y: usize,
}

impl GridCell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Rover-frame points expressed as parallel distance / angle lists.
///
/// Angles are radians measured from the forward axis, positive to the left.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolarSet {
    pub distances: Vec<f32>,
    pub angles: Vec<f32>,
}

impl PolarSet {
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Mean angle in degrees, or `None` for an empty set.
    pub fn mean_angle_deg(&self) -> Option<f32> {
        if self.angles.is_empty() {
            return None;
        }
        let sum: f32 = self.angles.iter().map(|a| a.to_degrees()).sum();
        Some(sum / self.angles.len() as f32)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Camera geometry
// ────────────────────────────────────────────────────────────────────────────

/// Calibration of the forward camera against the ground plane.
///
/// `source` holds four image pixels of a ground square; the square is
/// projected to a `2 * dst_size` pixel square centred horizontally and lifted
/// `bottom_offset` pixels above the bottom edge of the top-down view, so one
/// world-grid unit spans `2 * dst_size` top-down pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraGeometry {
    pub source: [[f32; 2]; 4],
    pub dst_size: f32,
    pub bottom_offset: f32,
    /// Ignore top-down pixels further than this from the rover origin.
    pub max_range_px: Option<f32>,
}

impl Default for CameraGeometry {
    fn default() -> Self {
        Self {
            source: [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]],
            dst_size: 5.0,
            bottom_offset: 10.0,
            max_range_px: None,
        }
    }
}

impl CameraGeometry {
    pub fn source_quad(&self) -> Quad {
        self.source.map(|[x, y]| Point2::new(x, y))
    }

    /// Destination square for a `width` × `height` frame, in the same corner
    /// order as the source (bottom-left, bottom-right, top-right, top-left).
    pub fn destination_quad(&self, width: usize, height: usize) -> Quad {
        let cx = width as f32 / 2.0;
        let bottom = height as f32 - self.bottom_offset;
        let top = bottom - 2.0 * self.dst_size;
        [
            Point2::new(cx - self.dst_size, bottom),
            Point2::new(cx + self.dst_size, bottom),
            Point2::new(cx + self.dst_size, top),
            Point2::new(cx - self.dst_size, top),
        ]
    }

    /// Top-down pixels per world-grid unit.
    pub fn scale(&self) -> f32 {
        2.0 * self.dst_size
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Homography
// ────────────────────────────────────────────────────────────────────────────

/// A plane-to-plane perspective mapping fitted to four correspondences.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Fit the mapping that sends `src[i]` to `dst[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`RoverError::DegenerateProjection`] when either quad has
    /// non-finite, repeated, or collinear points, or when the fitted matrix
    /// is singular.
    pub fn from_quads(src: &Quad, dst: &Quad) -> Result<Self, RoverError> {
        check_quad(src, "source")?;
        check_quad(dst, "destination")?;

        // h33 is fixed to 1, leaving eight unknowns and two equations per
        // correspondence.
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
            let (x, y) = (f64::from(s.x), f64::from(s.y));
            let (u, v) = (f64::from(d.x), f64::from(d.y));
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = u;
            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = v;
        }

        let h = a.lu().solve(&b).ok_or_else(|| {
            RoverError::DegenerateProjection("correspondence system is singular".to_string())
        })?;
        if h.iter().any(|c| !c.is_finite()) {
            return Err(RoverError::DegenerateProjection(
                "correspondence system has no finite solution".to_string(),
            ));
        }

        let forward = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let inverse = forward.try_inverse().ok_or_else(|| {
            RoverError::DegenerateProjection("perspective matrix is not invertible".to_string())
        })?;
        Ok(Self { forward, inverse })
    }

    fn map_back(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        apply(&self.inverse, x, y)
    }
}

fn apply(m: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
    if w.abs() < 1e-12 {
        return None;
    }
    Some((
        (m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)]) / w,
        (m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)]) / w,
    ))
}

/// Reject quads with a non-finite coordinate or any three (near-)collinear
/// corners.  Repeated corners are a special case of collinearity.
fn check_quad(quad: &Quad, which: &str) -> Result<(), RoverError> {
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(RoverError::DegenerateProjection(format!(
            "{which} quad has a non-finite corner"
        )));
    }
    for skip in 0..4 {
        let tri: Vec<&Point2<f32>> = quad
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, p)| p)
            .collect();
        let (ax, ay) = (f64::from(tri[0].x), f64::from(tri[0].y));
        let (bx, by) = (f64::from(tri[1].x), f64::from(tri[1].y));
        let (cx, cy) = (f64::from(tri[2].x), f64::from(tri[2].y));
        let area = 0.5 * ((bx - ax) * (cy - ay) - (cx - ax) * (by - ay)).abs();
        if area < MIN_TRIANGLE_AREA {
            return Err(RoverError::DegenerateProjection(format!(
                "{which} quad has three collinear corners"
            )));
        }
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Image → top-down view
// ────────────────────────────────────────────────────────────────────────────

/// Warp `frame` to a top-down view of the same size.
///
/// Returns the warped frame and a validity mask marking destination pixels
/// whose back-projection lands inside the camera image.  Invalid pixels are
/// black.
///
/// # Errors
///
/// Returns [`RoverError::DegenerateProjection`] when the quads cannot define
/// a perspective mapping, and [`RoverError::MalformedFrame`] for an empty
/// frame.
pub fn project_to_groundplane(
    frame: &Frame,
    source_quad: &Quad,
    dest_quad: &Quad,
) -> Result<(Frame, Mask), RoverError> {
    let h = Homography::from_quads(source_quad, dest_quad)?;
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(RoverError::MalformedFrame(format!(
            "cannot project a {width}x{height} frame"
        )));
    }
    let (max_x, max_y) = ((width - 1) as f64, (height - 1) as f64);

    let mut warped = Frame::filled(width, height, [0, 0, 0]);
    let mut valid = Mask::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let Some((sx, sy)) = h.map_back(x as f64, y as f64) else {
                continue;
            };
            let inside = sx >= -EDGE_TOLERANCE
                && sy >= -EDGE_TOLERANCE
                && sx <= max_x + EDGE_TOLERANCE
                && sy <= max_y + EDGE_TOLERANCE;
            if inside {
                warped.set_pixel(x, y, bilinear(frame, sx.clamp(0.0, max_x), sy.clamp(0.0, max_y)));
                valid.set(x, y, true);
            }
        }
    }
    Ok((warped, valid))
}

fn bilinear(frame: &Frame, x: f64, y: f64) -> [u8; 3] {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(frame.width() - 1);
    let y1 = (y0 + 1).min(frame.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let (p00, p10) = (frame.pixel(x0, y0), frame.pixel(x1, y0));
    let (p01, p11) = (frame.pixel(x0, y1), frame.pixel(x1, y1));
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = f64::from(p00[c]) * (1.0 - fx) + f64::from(p10[c]) * fx;
        let bottom = f64::from(p01[c]) * (1.0 - fx) + f64::from(p11[c]) * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Top-down pixels within `radius` of the rover origin (bottom-centre).
pub fn range_mask(width: usize, height: usize, radius: f32) -> Mask {
    let (ox, oy) = (width as f32 / 2.0, height as f32);
    Mask::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as f32 - ox, y as f32 - oy);
        (dx * dx + dy * dy).sqrt() < radius
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Rover frame
// ────────────────────────────────────────────────────────────────────────────

/// Lift every member pixel of a top-down `mask` into the rover frame.
///
/// Forward distance grows as the row moves up the image; lateral offset is
/// positive to the left of the image centre.
pub fn to_rover_frame(mask: &Mask) -> Vec<Point2<f32>> {
    let height = mask.height() as f32;
    let half_width = mask.width() as f32 / 2.0;
    mask.iter_set()
        .map(|(x, y)| Point2::new(height - y as f32, half_width - x as f32))
        .collect()
}

/// Rotate points counter-clockwise by `yaw` degrees.
pub fn rotate(points: &[Point2<f32>], yaw: f32) -> Vec<Point2<f32>> {
    let (sin, cos) = yaw.to_radians().sin_cos();
    points
        .iter()
        .map(|p| Point2::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos))
        .collect()
}

/// Divide by `scale` (rover units per world unit), then offset by `origin`.
pub fn translate_and_scale(
    points: &[Point2<f32>],
    origin: Point2<f32>,
    scale: f32,
) -> Vec<Point2<f32>> {
    points
        .iter()
        .map(|p| Point2::new(p.x / scale + origin.x, p.y / scale + origin.y))
        .collect()
}

/// Place rover-frame points in a `grid_size` × `grid_size` world grid.
///
/// Coordinates are truncated toward zero and clamped into
/// `[0, grid_size - 1]`; points outside the grid land on the nearest edge
/// cell rather than being dropped.
pub fn to_world_grid(
    points: &[Point2<f32>],
    pose: &Pose,
    grid_size: usize,
    scale: f32,
) -> Vec<GridCell> {
    let rotated = rotate(points, pose.yaw);
    let placed = translate_and_scale(&rotated, Point2::new(pose.x, pose.y), scale);
    placed
        .iter()
        .map(|p| GridCell::new(clamp_to_grid(p.x, grid_size), clamp_to_grid(p.y, grid_size)))
        .collect()
}

fn clamp_to_grid(v: f32, grid_size: usize) -> usize {
    let last = grid_size.saturating_sub(1);
    let v = v.trunc();
    // NaN and negatives fall to the first cell.
    if v.is_nan() || v <= 0.0 {
        0
    } else {
        (v as usize).min(last)
    }
}

/// Inverse of [`to_world_grid`] (without clamping): bring world cells back
/// into the rover frame of `pose`.
pub fn from_world_grid(cells: &[GridCell], pose: &Pose, scale: f32) -> Vec<Point2<f32>> {
    let local: Vec<Point2<f32>> = cells
        .iter()
        .map(|c| Point2::new((c.x as f32 - pose.x) * scale, (c.y as f32 - pose.y) * scale))
        .collect();
    rotate(&local, -pose.yaw)
}

/// Polar form of rover-frame points.
pub fn to_polar(points: &[Point2<f32>]) -> PolarSet {
    let (distances, angles) = points
        .iter()
        .map(|p| ((p.x * p.x + p.y * p.y).sqrt(), p.y.atan2(p.x)))
        .unzip();
    PolarSet { distances, angles }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn corners(width: usize, height: usize) -> Quad {
        let (w, h) = ((width - 1) as f32, (height - 1) as f32);
        [
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ]
    }

    fn gradient(width: usize, height: usize) -> Frame {
        let mut frame = Frame::filled(width, height, [0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(x, y, [(x * 10) as u8, (y * 10) as u8, 100]);
            }
        }
        frame
    }

    // ── rotate / translate ──────────────────────────────────────────────────

    #[test]
    fn rotate_then_unrotate_is_identity() {
        let points = vec![
            Point2::new(3.0, -2.0),
            Point2::new(-7.5, 0.25),
            Point2::new(100.0, 40.0),
        ];
        for yaw in [-270.0_f32, -90.0, -12.5, 0.0, 33.0, 90.0, 181.0, 359.0] {
            let back = rotate(&rotate(&points, yaw), -yaw);
            for (p, q) in points.iter().zip(&back) {
                assert!((p.x - q.x).abs() < 1e-3, "yaw={yaw} x {} vs {}", p.x, q.x);
                assert!((p.y - q.y).abs() < 1e-3, "yaw={yaw} y {} vs {}", p.y, q.y);
            }
        }
    }

    #[test]
    fn rotate_90_sends_forward_to_left() {
        let r = rotate(&[Point2::new(2.0, 0.0)], 90.0);
        assert!(r[0].x.abs() < 1e-5);
        assert!((r[0].y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn translate_and_scale_divides_then_offsets() {
        let r = translate_and_scale(&[Point2::new(10.0, -20.0)], Point2::new(100.0, 50.0), 10.0);
        assert!((r[0].x - 101.0).abs() < 1e-5);
        assert!((r[0].y - 48.0).abs() < 1e-5);
    }

    // ── world grid ──────────────────────────────────────────────────────────

    #[test]
    fn to_world_grid_places_points_relative_to_pose() {
        let pose = Pose {
            x: 50.0,
            y: 60.0,
            yaw: 0.0,
            ..Pose::default()
        };
        let cells = to_world_grid(&[Point2::new(25.0, 10.0)], &pose, 200, 10.0);
        assert_eq!(cells, vec![GridCell::new(52, 61)]);
    }

    #[test]
    fn to_world_grid_clamps_far_points_into_grid() {
        let pose = Pose {
            x: 10.0,
            y: 190.0,
            yaw: 45.0,
            ..Pose::default()
        };
        let points = vec![
            Point2::new(1e6, 1e6),
            Point2::new(-1e6, 3.0),
            Point2::new(0.0, -1e7),
            Point2::new(f32::NAN, 2.0),
        ];
        for size in [1usize, 10, 200] {
            for cell in to_world_grid(&points, &pose, size, 10.0) {
                assert!(cell.x < size && cell.y < size, "{cell:?} outside {size}");
            }
        }
    }

    #[test]
    fn from_world_grid_inverts_placement() {
        let pose = Pose {
            x: 80.0,
            y: 40.0,
            yaw: 30.0,
            ..Pose::default()
        };
        let cell = GridCell::new(90, 47);
        let local = from_world_grid(&[cell], &pose, 10.0);
        let again = to_world_grid(&local, &pose, 200, 10.0);
        // Truncation can move a point that lands exactly on a boundary.
        assert!((again[0].x as i64 - 90).abs() <= 1);
        assert!((again[0].y as i64 - 47).abs() <= 1);
    }

    // ── rover frame / polar ─────────────────────────────────────────────────

    #[test]
    fn to_rover_frame_origin_is_bottom_centre() {
        let mut mask = Mask::new(10, 5);
        mask.set(5, 4, true); // just above the bottom edge, centred
        mask.set(0, 0, true); // top-left
        let pts = to_rover_frame(&mask);
        // Row-major order: (0, 0) first.
        assert_eq!(pts[0], Point2::new(5.0, 5.0));
        assert_eq!(pts[1], Point2::new(1.0, 0.0));
    }

    #[test]
    fn to_polar_distance_and_angle() {
        let polar = to_polar(&[Point2::new(3.0, 4.0), Point2::new(1.0, -1.0)]);
        assert!((polar.distances[0] - 5.0).abs() < 1e-5);
        assert!((polar.angles[1] + std::f32::consts::FRAC_PI_4).abs() < 1e-5);
        assert_eq!(polar.len(), 2);
    }

    #[test]
    fn mean_angle_is_in_degrees() {
        let polar = to_polar(&[Point2::new(1.0, 1.0), Point2::new(1.0, 0.0)]);
        assert!((polar.mean_angle_deg().unwrap() - 22.5).abs() < 1e-3);
        assert!(PolarSet::default().mean_angle_deg().is_none());
    }

    // ── homography / warp ───────────────────────────────────────────────────

    #[test]
    fn homography_maps_source_corners_to_destination() {
        let geometry = CameraGeometry::default();
        let src = geometry.source_quad();
        let dst = geometry.destination_quad(320, 160);
        let h = Homography::from_quads(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let (mx, my) = apply(&h.forward, f64::from(s.x), f64::from(s.y)).unwrap();
            assert!((mx as f32 - d.x).abs() < 1e-2, "({mx}, {my}) vs {d:?}");
            assert!((my as f32 - d.y).abs() < 1e-2, "({mx}, {my}) vs {d:?}");

            // The warp samples through the inverse.
            let (bx, by) = h.map_back(f64::from(d.x), f64::from(d.y)).unwrap();
            assert!((bx as f32 - s.x).abs() < 1e-2, "({bx}, {by}) vs {s:?}");
            assert!((by as f32 - s.y).abs() < 1e-2, "({bx}, {by}) vs {s:?}");
        }
    }

    #[test]
    fn collinear_quad_is_degenerate() {
        let bad = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 5.0),
        ];
        let good = corners(10, 10);
        assert!(matches!(
            Homography::from_quads(&bad, &good),
            Err(RoverError::DegenerateProjection(_))
        ));
    }

    #[test]
    fn repeated_corner_is_degenerate() {
        let good = corners(10, 10);
        let mut bad = good;
        bad[3] = bad[0];
        let frame = Frame::filled(10, 10, [0, 0, 0]);
        assert!(matches!(
            project_to_groundplane(&frame, &good, &bad),
            Err(RoverError::DegenerateProjection(_))
        ));
    }

    #[test]
    fn identity_projection_preserves_frame() {
        let frame = gradient(12, 8);
        let quad = corners(12, 8);
        let (warped, valid) = project_to_groundplane(&frame, &quad, &quad).unwrap();
        assert_eq!(valid.count(), 12 * 8);
        for y in 0..8 {
            for x in 0..12 {
                let (a, b) = (frame.pixel(x, y), warped.pixel(x, y));
                for c in 0..3 {
                    assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 1);
                }
            }
        }
    }

    #[test]
    fn shrinking_projection_marks_outside_invalid() {
        let frame = Frame::filled(20, 20, [200, 200, 200]);
        let src = corners(20, 20);
        let dst = [
            Point2::new(5.0, 5.0),
            Point2::new(14.0, 5.0),
            Point2::new(14.0, 14.0),
            Point2::new(5.0, 14.0),
        ];
        let (warped, valid) = project_to_groundplane(&frame, &src, &dst).unwrap();
        assert!(!valid.get(0, 0));
        assert_eq!(warped.pixel(0, 0), [0, 0, 0]);
        assert!(valid.get(10, 10));
        assert_eq!(warped.pixel(10, 10), [200, 200, 200]);
        assert!(valid.count() < 20 * 20);
    }

    #[test]
    fn destination_quad_sits_above_bottom_centre() {
        let g = CameraGeometry::default();
        let dst = g.destination_quad(320, 160);
        assert_eq!(dst[0], Point2::new(155.0, 150.0));
        assert_eq!(dst[2], Point2::new(165.0, 140.0));
        assert!((g.scale() - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn range_mask_is_a_half_disc_at_the_bottom() {
        let m = range_mask(20, 10, 5.0);
        assert!(m.get(10, 9));
        assert!(!m.get(10, 0));
        assert!(!m.get(0, 9));
    }
}
