use crate::KeyPoint;
use image::GrayImage;
use ndarray::Array2;

/// A planar feature detector and descriptor extractor.
///
/// This is everything [`CameraAwareFeature`](crate::CameraAwareFeature) needs from the
/// wrapped algorithm. Descriptors are returned as a row-major matrix with one row
/// per keypoint; the element type and row width are up to the implementation but
/// must be the same for every call.
pub trait Feature2d {
    /// The element type of the descriptor matrix.
    type Descriptor: Clone;
    /// The error returned by detection or description.
    type Error: std::error::Error + 'static;

    /// Find keypoints in `image`, only where `mask` is non-zero if a mask is given.
    fn detect(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, Self::Error>;

    /// Describe `keypoints` in `image`.
    ///
    /// The implementation may drop keypoints it cannot describe. The returned keypoints
    /// must keep their `class_id` and be aligned row for row with the descriptors.
    #[allow(clippy::type_complexity)]
    fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<Self::Descriptor>), Self::Error>;

    /// Returns the keypoint refinement capability if this detector has one.
    fn keypoint_refiner(&self) -> Option<&dyn RefineKeypoints<Error = Self::Error>> {
        None
    }
}

/// Detectors that can take existing keypoints into account while detecting.
///
/// Exposed through [`Feature2d::keypoint_refiner`].
pub trait RefineKeypoints {
    type Error;

    /// Detect in `image` starting from the provided `keypoints` instead of discarding them.
    fn refine(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
        keypoints: Vec<KeyPoint>,
    ) -> Result<Vec<KeyPoint>, Self::Error>;
}
