use cv_core::nalgebra::Point2;
use cv_core::ImagePoint;

/// A point of interest in an image.
/// This pretty much follows from OpenCV conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// The horizontal and vertical pixel coordinate. +x faces right and +y
    /// faces toward the bottom of the image, starting from the top left.
    pub point: (f32, f32),
    /// The magnitude of response from the detector.
    pub response: f32,

    /// The diameter of the meaningful neighborhood, in pixel units
    pub size: f32,

    /// The level of scale space in which the keypoint was detected.
    pub octave: usize,

    /// A classification ID
    ///
    /// While a keypoint is inside of [`CameraAwareFeature`](crate::CameraAwareFeature)
    /// this carries its identity tag, so detectors must pass it through `compute` unchanged.
    pub class_id: usize,

    /// The orientation angle
    pub angle: f32,
}

impl KeyPoint {
    /// A keypoint at `point` with the given `size` and everything else zeroed.
    pub fn new(point: (f32, f32), size: f32) -> Self {
        Self {
            point,
            response: 0.0,
            size,
            octave: 0,
            class_id: 0,
            angle: 0.0,
        }
    }

    /// Whether the neighborhood of `scale * size` pixels around the keypoint
    /// lies within a `width` by `height` image.
    pub fn is_inside(&self, scale: f32, width: u32, height: u32) -> bool {
        let radius = self.size * scale;
        let (x, y) = self.point;
        x - radius >= 0.0
            && y - radius >= 0.0
            && x + radius <= width as f32
            && y + radius <= height as f32
    }
}

impl ImagePoint for KeyPoint {
    fn image_point(&self) -> Point2<f64> {
        Point2::new(self.point.0 as f64, self.point.1 as f64)
    }
}

/// Drops every keypoint closer than `scale * size` pixels to an edge of the image.
///
/// The order of the remaining keypoints is preserved.
pub fn remove_border_keypoints(keypoints: &mut Vec<KeyPoint>, scale: f32, width: u32, height: u32) {
    keypoints.retain(|keypoint| keypoint.is_inside(scale, width, height));
}
