use cv_core::nalgebra::{Point2, Vector3};

/// The projection model of the distorted camera that captured the images.
///
/// This is the only thing the engine needs to know about the lens. Rays use the
/// same frame as `cv-core` bearings: X points right, Y points down, and Z points
/// forwards out of the optical center. Pixel coordinates have +x to the right
/// and +y towards the bottom of the image, with the origin at the top left.
///
/// Implementations are expected to be cheap plain data, so the engine requires
/// `Sync` in order to build patch maps from several threads.
pub trait CameraGeometry: Sync {
    /// Width of the images produced by this camera, in pixels.
    fn width(&self) -> u32;

    /// Height of the images produced by this camera, in pixels.
    fn height(&self) -> u32;

    /// Back-projects a pixel location to a ray out of the optical center.
    ///
    /// The ray does not need to be normalized.
    fn keypoint_to_euclidean(&self, point: Point2<f64>) -> Vector3<f64>;

    /// Projects a ray into the image.
    ///
    /// Returns `None` when the ray has no image (for instance when it points
    /// behind a camera whose field of view is narrower than a hemisphere).
    /// The returned pixel may lie outside of the image bounds.
    fn euclidean_to_keypoint(&self, ray: &Vector3<f64>) -> Option<Point2<f64>>;

    /// Back-projects a pixel location to a unit ray.
    fn bearing(&self, point: Point2<f64>) -> Vector3<f64> {
        self.keypoint_to_euclidean(point).normalize()
    }
}

impl<T> CameraGeometry for &T
where
    T: CameraGeometry + ?Sized,
{
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn keypoint_to_euclidean(&self, point: Point2<f64>) -> Vector3<f64> {
        (**self).keypoint_to_euclidean(point)
    }

    fn euclidean_to_keypoint(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        (**self).euclidean_to_keypoint(ray)
    }
}
