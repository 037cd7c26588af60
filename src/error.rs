use thiserror::Error;

/// Failures while deriving the patch layout from a camera.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("distortion tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),
    #[error("camera image must not be empty, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("could not estimate a focal length from the image center, got {0}")]
    DegenerateFocalLength(f64),
    #[error("a {cols}x{rows} patch grid exceeds the {max} labels of the selection map")]
    TooManyPatches { cols: usize, rows: usize, max: usize },
    #[error("patch {index} has an empty undistorted extent ({width}x{height})")]
    EmptyPatch {
        index: usize,
        width: f64,
        height: f64,
    },
}

/// Failures of [`CameraAwareFeature`](crate::CameraAwareFeature) detection and description.
///
/// `E` is the error type of the wrapped detector, which is passed through untouched.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    #[error("no camera geometry has been configured")]
    NotConfigured,
    #[error("image is {actual:?} but the camera produces {expected:?}")]
    ImageSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("mask is {actual:?} but the image is {expected:?}")]
    MaskSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("patch {patch} returned {rows} descriptor rows for {keypoints} keypoints")]
    DescriptorRows {
        patch: usize,
        rows: usize,
        keypoints: usize,
    },
    #[error("patch {patch} returned descriptors {actual} wide, expected {expected}")]
    DescriptorColumns {
        patch: usize,
        expected: usize,
        actual: usize,
    },
    #[error("patch {patch} returned a keypoint with unknown tag {tag}")]
    UnknownTag { patch: usize, tag: usize },
    #[error("descriptor blocks could not be stacked: {0}")]
    Stack(ndarray::ShapeError),
    #[error(transparent)]
    Detector(E),
}
