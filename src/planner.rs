//! Splitting the field of view into a grid of patches.

use crate::{CameraGeometry, GeometryError};
use cv_core::nalgebra::{Point2, Rotation3, Vector3};
use float_ord::FloatOrd;
use log::*;

/// The largest number of patches, limited by the 16-bit selection map.
pub const MAX_PATCHES: usize = u16::MAX as usize;

/// The patch layout over an image: how many patches, where they look, and the
/// focal length their pinhole views share.
#[derive(Debug, Clone)]
pub struct PatchGrid {
    /// Number of patches across the image (`N_x`).
    pub cols: usize,
    /// Number of patches down the image (`N_y`).
    pub rows: usize,
    /// Focal length in pixels of every undistorted patch view.
    pub focal_length: f64,
    /// Unit ray through the center of each patch, indexed by `m + n * cols`.
    pub centers: Vec<Vector3<f64>>,
    /// Width and height of the original image.
    pub image_size: (u32, u32),
}

impl PatchGrid {
    /// Plans the patches for `camera` so that no patch spans more than roughly
    /// `2 * tolerance` radians.
    pub fn plan(camera: &impl CameraGeometry, tolerance: f64) -> Result<Self, GeometryError> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(GeometryError::InvalidTolerance(tolerance));
        }
        let (width, height) = (camera.width(), camera.height());
        if width == 0 || height == 0 {
            return Err(GeometryError::EmptyImage { width, height });
        }
        let focal_length = estimate_focal_length(camera);
        if !focal_length.is_finite() || focal_length <= 0.0 {
            return Err(GeometryError::DegenerateFocalLength(focal_length));
        }
        let (angle_x, angle_y) = field_of_view(camera);
        let cols = (angle_x / 2.0 / tolerance + 1.0) as usize;
        let rows = (angle_y / 2.0 / tolerance + 1.0) as usize;
        if cols.saturating_mul(rows) > MAX_PATCHES {
            return Err(GeometryError::TooManyPatches {
                cols,
                rows,
                max: MAX_PATCHES,
            });
        }
        info!(
            "Field of view {:.1}x{:.1} degrees split into {}x{} patches with focal length {:.2}",
            angle_x.to_degrees(),
            angle_y.to_degrees(),
            cols,
            rows,
            focal_length
        );

        let bin_width = width as f64 / cols as f64;
        let bin_height = height as f64 / rows as f64;
        let mut centers = Vec::with_capacity(cols * rows);
        for n in 0..rows {
            for m in 0..cols {
                let center = Point2::new(
                    bin_width / 2.0 + m as f64 * bin_width,
                    bin_height / 2.0 + n as f64 * bin_height,
                );
                centers.push(camera.bearing(center));
            }
        }

        Ok(Self {
            cols,
            rows,
            focal_length,
            centers,
            image_size: (width, height),
        })
    }

    /// The total number of patches.
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The linear index of the patch at grid column `m` and row `n`.
    pub fn index(&self, m: usize, n: usize) -> usize {
        m + n * self.cols
    }

    /// The pixel rectangle of the original image that patch `(m, n)` is centered on,
    /// as `(x0, y0, x1, y1)`.
    pub fn bin(&self, m: usize, n: usize) -> (f64, f64, f64, f64) {
        let bin_width = self.image_size.0 as f64 / self.cols as f64;
        let bin_height = self.image_size.1 as f64 / self.rows as f64;
        (
            m as f64 * bin_width,
            n as f64 * bin_height,
            (m + 1) as f64 * bin_width,
            (n + 1) as f64 * bin_height,
        )
    }
}

/// The rotation that brings rays from the camera frame into the frame of a patch
/// looking along `center`.
///
/// This is the axis-angle rotation about `center × z` whose angle is the norm of that
/// cross product. The inverse is its transpose.
pub fn alignment_rotation(center: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::from_scaled_axis(center.cross(&Vector3::z()))
}

/// Angles spanned by the image horizontally and vertically, measured between the
/// corner rays of each row and column and taking the larger of the two.
fn field_of_view(camera: &impl CameraGeometry) -> (f64, f64) {
    let (width, height) = (camera.width() as f64, camera.height() as f64);
    let top_left = camera.bearing(Point2::new(0.0, 0.0));
    let top_right = camera.bearing(Point2::new(width, 0.0));
    let bottom_left = camera.bearing(Point2::new(0.0, height));
    let bottom_right = camera.bearing(Point2::new(width, height));
    let angle = |a: &Vector3<f64>, b: &Vector3<f64>| a.dot(b).clamp(-1.0, 1.0).acos();
    let angle_x = FloatOrd(angle(&top_left, &top_right))
        .max(FloatOrd(angle(&bottom_left, &bottom_right)));
    let angle_y = FloatOrd(angle(&top_left, &bottom_left))
        .max(FloatOrd(angle(&top_right, &bottom_right)));
    (angle_x.0, angle_y.0)
}

/// Inverse of the horizontal rate of change of the normalized ray at the image center,
/// using a central difference over two pixels.
fn estimate_focal_length(camera: &impl CameraGeometry) -> f64 {
    let (cx, cy) = (camera.width() as f64 / 2.0, camera.height() as f64 / 2.0);
    let minus = camera.keypoint_to_euclidean(Point2::new(cx - 1.0, cy));
    let plus = camera.keypoint_to_euclidean(Point2::new(cx + 1.0, cy));
    1.0 / ((plus.x / plus.z - minus.x / minus.z) / 2.0)
}
