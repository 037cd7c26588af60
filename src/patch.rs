use crate::boundary::{trace_corners, Extent, ImageEdges};
use crate::maps::PatchView;
use crate::planner::alignment_rotation;
use crate::remap::{Border, GrayBuffer, RemapTable};
use crate::{CameraGeometry, GeometryError, KeyPoint, PatchGrid};
use cv_core::nalgebra::Point2;
use image::{GrayImage, ImageBuffer, Luma};
use log::*;

/// Extents within this many pixels above a whole number are not rounded up.
const SIZE_EPSILON: f64 = 1e-6;

/// One cell of the patch grid: a locally undistorted pinhole view of part of the image.
///
/// Patches are built once when the camera is configured and never change afterwards.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Linear index `m + n * cols` of the patch.
    pub index: usize,
    /// Grid column `m` and row `n`.
    pub grid: (usize, usize),
    /// The sides of the patch that lie on the border of the original image.
    pub edges: ImageEdges,
    /// The overlap in pixels on every side that does not lie on the border.
    pub margin: u32,
    /// The pinhole view of the patch.
    pub view: PatchView,
    /// Patch pixel to original pixel.
    pub forward: RemapTable,
    /// Original pixel to patch pixel.
    pub backward: RemapTable,
}

impl Patch {
    /// Computes the view and both lookup tables of patch `(m, n)`.
    pub fn build(
        camera: &impl CameraGeometry,
        grid: &PatchGrid,
        m: usize,
        n: usize,
        margin: u32,
    ) -> Result<Self, GeometryError> {
        let index = grid.index(m, n);
        let edges = ImageEdges::of(grid, m, n);
        let rotation = alignment_rotation(&grid.centers[index]);
        let corners = trace_corners(camera, grid, m, n, &rotation);
        let extent = Extent::new(&corners, edges, grid.focal_length, margin);
        // Rounded up so that the labelled area reaches the seam with each neighbor.
        let whole = |v: f64| (v - SIZE_EPSILON).ceil();
        let (width, height) = (whole(extent.width), whole(extent.height));
        let representable = |v: f64| (1.0..=u32::MAX as f64).contains(&v);
        if !representable(width) || !representable(height) {
            return Err(GeometryError::EmptyPatch {
                index,
                width: extent.width,
                height: extent.height,
            });
        }
        let view = PatchView {
            rotation,
            center: extent.center,
            focal_length: grid.focal_length,
            size: (width as u32, height as u32),
        };
        debug!(
            "patch {} at ({}, {}) is {}x{} with center ({:.1}, {:.1})",
            index, m, n, view.size.0, view.size.1, view.center.0, view.center.1
        );
        let forward = view.forward_map(camera);
        let backward = view.backward_map(camera);
        Ok(Self {
            index,
            grid: (m, n),
            edges,
            margin,
            view,
            forward,
            backward,
        })
    }

    /// Size `(width, height)` of the undistorted view.
    pub fn size(&self) -> (u32, u32) {
        self.view.size
    }

    /// The value this patch writes into the selection map.
    pub fn label(&self) -> u16 {
        self.index as u16 + 1
    }

    /// Resamples the original image into this patch's undistorted view.
    pub fn undistort_image(&self, image: &GrayImage) -> GrayImage {
        self.forward.remap(image, Border::Constant)
    }

    /// Moves a point of the original image into this patch's view.
    pub fn undistort_point(&self, point: Point2<f32>) -> Option<Point2<f32>> {
        self.backward.interpolate(point)
    }

    /// Moves a point of this patch's view back into the original image.
    pub fn distort_point(&self, point: Point2<f32>) -> Option<Point2<f32>> {
        self.forward.interpolate(point)
    }

    /// [`Patch::undistort_point`] applied to the position of a keypoint.
    pub fn undistort_keypoint(&self, keypoint: &KeyPoint) -> Option<KeyPoint> {
        let point = self.undistort_point(Point2::new(keypoint.point.0, keypoint.point.1))?;
        Some(KeyPoint {
            point: (point.x, point.y),
            ..*keypoint
        })
    }

    /// [`Patch::distort_point`] applied to the position of a keypoint.
    pub fn distort_keypoint(&self, keypoint: &KeyPoint) -> Option<KeyPoint> {
        let point = self.distort_point(Point2::new(keypoint.point.0, keypoint.point.1))?;
        Some(KeyPoint {
            point: (point.x, point.y),
            ..*keypoint
        })
    }

    /// The patch label over the whole view, with the margin strips on sides that face
    /// another patch cleared to zero.
    pub fn label_image(&self) -> GrayBuffer<u16> {
        let (width, height) = self.size();
        let margin = self.margin;
        let edges = self.edges;
        let label = self.label();
        ImageBuffer::from_fn(width, height, |x, y| {
            let in_margin = (!edges.left && x < margin)
                || (!edges.top && y < margin)
                || (!edges.right && x + margin >= width)
                || (!edges.bottom && y + margin >= height);
            Luma([if in_margin { 0 } else { label }])
        })
    }

    /// The pixels of the original image this patch claims, as a map holding its label
    /// where claimed and zero elsewhere.
    ///
    /// The label image is resampled bilinearly through the backward table. A pixel is
    /// claimed when at least half of its interpolation weight falls on the label, so
    /// blends along the margin never produce some other patch's label. Sides on the
    /// image border extend outwards.
    pub fn claims(&self) -> GrayBuffer<u16> {
        let label = self.label();
        let mut warped = self.backward.remap(&self.label_image(), Border::Replicate);
        for pixel in warped.pixels_mut() {
            pixel[0] = if 2 * pixel[0] as u32 >= label as u32 {
                label
            } else {
                0
            };
        }
        warped
    }
}
