//! Forward and backward lookup tables between the original image and a patch view.

use crate::remap::RemapTable;
use crate::CameraGeometry;
use cv_core::nalgebra::{Point2, Rotation3, Vector3};
use ndarray::Array2;

/// The pinhole view of a single patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchView {
    /// Rotation bringing rays from the camera frame into the patch frame.
    pub rotation: Rotation3<f64>,
    /// Pixel coordinate `(cu, cv)` where the patch's center ray lands.
    pub center: (f64, f64),
    /// Focal length of the view, in pixels.
    pub focal_length: f64,
    /// Size of the view `(width, height)` in pixels.
    pub size: (u32, u32),
}

impl PatchView {
    /// The ray in the camera frame seen by a pixel of the view.
    pub fn ray(&self, u: f64, v: f64) -> Vector3<f64> {
        let local = Vector3::new(
            (u - self.center.0) / self.focal_length,
            (v - self.center.1) / self.focal_length,
            1.0,
        );
        self.rotation.inverse() * local
    }

    /// The pixel of the view that sees a ray in the camera frame.
    ///
    /// Rays behind the view's image plane have no pixel.
    pub fn project(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        let local = self.rotation * ray;
        (local.z > 0.0).then(|| {
            Point2::new(
                local.x / local.z * self.focal_length + self.center.0,
                local.y / local.z * self.focal_length + self.center.1,
            )
        })
    }

    /// For every pixel of the view, the pixel of the original image it shows.
    pub fn forward_map(&self, camera: &impl CameraGeometry) -> RemapTable {
        let (width, height) = self.size;
        build_table(width, height, |u, v| {
            camera.euclidean_to_keypoint(&self.ray(u, v))
        })
    }

    /// For every pixel of the original image, the pixel of the view that shows it.
    pub fn backward_map(&self, camera: &impl CameraGeometry) -> RemapTable {
        build_table(camera.width(), camera.height(), |x, y| {
            self.project(&camera.keypoint_to_euclidean(Point2::new(x, y)))
        })
    }
}

/// Fills a `width` by `height` table from `f`, writing NaN where `f` has no answer.
fn build_table(
    width: u32,
    height: u32,
    f: impl Fn(f64, f64) -> Option<Point2<f64>>,
) -> RemapTable {
    let shape = (height as usize, width as usize);
    let mut map_x = Array2::from_elem(shape, f32::NAN);
    let mut map_y = Array2::from_elem(shape, f32::NAN);
    for ((y, x), entry) in map_x.indexed_iter_mut() {
        if let Some(point) = f(x as f64, y as f64) {
            *entry = point.x as f32;
            map_y[(y, x)] = point.y as f32;
        }
    }
    RemapTable::new(map_x, map_y)
}
