//! # Camera-aware features
//!
//! Planar feature detectors and descriptors assume a pinhole camera. Wide angle and
//! fisheye lenses bend straight lines and stretch the image towards its border, so the
//! same scene point looks different depending on where in the image it lands. This
//! crate wraps any [`Feature2d`] so that it can be used on such cameras anyway.
//!
//! The field of view of the camera is split into a grid of patches. Each patch is small
//! enough that a pinhole view rotated to look at its center barely deviates from the
//! real lens. Keypoints are detected on the distorted image as usual, then each keypoint
//! is handed to the one patch responsible for it, described in that patch's undistorted
//! view, and returned at its original position.
//!
//! The only thing needed about the lens is a [`CameraGeometry`], which maps pixels to
//! rays and back.
//!
//! ```ignore
//! let feature = CameraAwareFeature::new(detector, camera, 0.5)?;
//! let (keypoints, descriptors) = feature.detect_and_compute(&image, None, vec![], false)?;
//! ```

mod boundary;
mod camera;
mod camera_aware;
mod error;
mod feature;
mod keypoint;
mod maps;
mod patch;
mod planner;
pub mod remap;
mod selection;
mod settings;

pub use boundary::{three_plane_intersection, Corners, Extent, ImageEdges};
pub use camera::CameraGeometry;
pub use camera_aware::CameraAwareFeature;
pub use cv_core::nalgebra;
pub use error::{Error, GeometryError};
pub use feature::{Feature2d, RefineKeypoints};
pub use keypoint::{remove_border_keypoints, KeyPoint};
pub use maps::PatchView;
pub use patch::Patch;
pub use planner::{alignment_rotation, PatchGrid, MAX_PATCHES};
pub use selection::SelectionMap;
pub use settings::Settings;
