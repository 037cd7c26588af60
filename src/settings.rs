#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings that shape the patch layout and keypoint filtering.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Settings {
    /// The largest angle (in radians) by which a patch may deviate from a pinhole view.
    ///
    /// A larger tolerance gives fewer, more distorted patches.
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_distortion_tolerance")
    )]
    pub distortion_tolerance: f64,
    /// The overlap in pixels added to every patch side that faces another patch.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_margin"))]
    pub margin: u32,
    /// Keypoints closer than `border_scale * size` pixels to an image edge are dropped.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_border_scale"))]
    pub border_scale: f32,
}

impl Settings {
    /// Default settings with a specific distortion tolerance.
    pub fn new(distortion_tolerance: f64) -> Self {
        Self {
            distortion_tolerance,
            ..Default::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            distortion_tolerance: default_distortion_tolerance(),
            margin: default_margin(),
            border_scale: default_border_scale(),
        }
    }
}

fn default_distortion_tolerance() -> f64 {
    0.5
}

fn default_margin() -> u32 {
    100
}

fn default_border_scale() -> f32 {
    2.0
}
