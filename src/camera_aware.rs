use crate::{
    remove_border_keypoints, CameraGeometry, Error, Feature2d, GeometryError, KeyPoint, Patch,
    PatchGrid, SelectionMap, Settings,
};
use image::GrayImage;
use log::*;
use ndarray::{Array2, Axis};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Everything derived from the camera when it is configured.
///
/// Built in one go and never modified; changing the camera or settings replaces it.
#[derive(Debug, Clone)]
struct Geometry {
    grid: PatchGrid,
    patches: Vec<Patch>,
    selection: SelectionMap,
}

impl Geometry {
    fn build(camera: &impl CameraGeometry, settings: &Settings) -> Result<Self, GeometryError> {
        let grid = PatchGrid::plan(camera, settings.distortion_tolerance)?;
        let cells: Vec<(usize, usize)> = (0..grid.rows)
            .flat_map(|n| (0..grid.cols).map(move |m| (m, n)))
            .collect();
        let build_patch = |&(m, n): &(usize, usize)| {
            trace!("Building patch ({}, {}).", m, n);
            Patch::build(camera, &grid, m, n, settings.margin)
        };
        #[cfg(not(feature = "rayon"))]
        let patches = cells
            .iter()
            .map(build_patch)
            .collect::<Result<Vec<_>, _>>()?;
        #[cfg(feature = "rayon")]
        let patches = cells
            .par_iter()
            .map(build_patch)
            .collect::<Result<Vec<_>, _>>()?;
        trace!("Building selection map.");
        let selection = SelectionMap::build(&patches, grid.image_size);
        let unassigned = selection.unassigned();
        if unassigned != 0 {
            warn!(
                "{} pixels of the {}x{} image are not covered by any patch",
                unassigned, grid.image_size.0, grid.image_size.1
            );
        }
        Ok(Self {
            grid,
            patches,
            selection,
        })
    }
}

/// Runs a planar detector and descriptor on a distorted camera.
///
/// The image is split into a grid of patches, each small enough that its part of the
/// image is nearly a pinhole view. Keypoints are detected on the whole distorted image,
/// but every keypoint is described in the undistorted view of the one patch responsible
/// for it. Descriptors therefore see the scene without lens distortion while keypoint
/// positions stay in the coordinates of the original image.
///
/// All geometry is computed when a camera is set and is only read by detection.
/// Changing the camera or the settings takes `&mut self` and rebuilds it wholesale.
#[derive(Debug, Clone)]
pub struct CameraAwareFeature<F, C> {
    feature: F,
    settings: Settings,
    camera: Option<C>,
    geometry: Option<Geometry>,
}

impl<F, C> CameraAwareFeature<F, C>
where
    F: Feature2d,
    C: CameraGeometry,
{
    /// Wraps `feature` for `camera` with default settings and the given distortion tolerance.
    pub fn new(feature: F, camera: C, distortion_tolerance: f64) -> Result<Self, GeometryError> {
        Self::with_settings(feature, camera, Settings::new(distortion_tolerance))
    }

    /// Wraps `feature` for `camera`.
    pub fn with_settings(feature: F, camera: C, settings: Settings) -> Result<Self, GeometryError> {
        let mut this = Self::unconfigured(feature, settings);
        this.set_camera_geometry(camera)?;
        Ok(this)
    }

    /// Wraps `feature` without a camera.
    ///
    /// Only [`CameraAwareFeature::detect`] works until
    /// [`CameraAwareFeature::set_camera_geometry`] is called.
    pub fn unconfigured(feature: F, settings: Settings) -> Self {
        Self {
            feature,
            settings,
            camera: None,
            geometry: None,
        }
    }

    /// Replaces the wrapped detector. The geometry is kept.
    pub fn set_feature(&mut self, feature: F) {
        self.feature = feature;
    }

    /// Sets the camera and builds all of the patch geometry for it.
    ///
    /// On failure the previous camera and geometry are kept.
    pub fn set_camera_geometry(&mut self, camera: C) -> Result<(), GeometryError> {
        let geometry = Geometry::build(&camera, &self.settings)?;
        self.camera = Some(camera);
        self.geometry = Some(geometry);
        Ok(())
    }

    /// Changes the distortion tolerance, rebuilding the geometry if a camera is set.
    pub fn set_distortion_tolerance(&mut self, distortion_tolerance: f64) -> Result<(), GeometryError> {
        self.set_settings(Settings {
            distortion_tolerance,
            ..self.settings
        })
    }

    /// Changes all settings, rebuilding the geometry if a camera is set.
    ///
    /// On failure the previous settings and geometry are kept.
    pub fn set_settings(&mut self, settings: Settings) -> Result<(), GeometryError> {
        let tolerance = settings.distortion_tolerance;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(GeometryError::InvalidTolerance(tolerance));
        }
        if let Some(camera) = &self.camera {
            self.geometry = Some(Geometry::build(camera, &settings)?);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn feature(&self) -> &F {
        &self.feature
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn camera(&self) -> Option<&C> {
        self.camera.as_ref()
    }

    /// Whether a camera has been set and its geometry built.
    pub fn is_configured(&self) -> bool {
        self.geometry.is_some()
    }

    /// The patch layout, if configured.
    pub fn grid(&self) -> Option<&PatchGrid> {
        self.geometry.as_ref().map(|geometry| &geometry.grid)
    }

    /// The focal length shared by every patch view, if configured.
    pub fn focal_length(&self) -> Option<f64> {
        self.grid().map(|grid| grid.focal_length)
    }

    /// Every patch indexed by `m + n * cols`, or nothing if not configured.
    pub fn patches(&self) -> &[Patch] {
        self.geometry
            .as_ref()
            .map_or(&[], |geometry| geometry.patches.as_slice())
    }

    /// The patch responsible for each pixel, if configured.
    pub fn selection_map(&self) -> Option<&SelectionMap> {
        self.geometry.as_ref().map(|geometry| &geometry.selection)
    }

    /// Detects keypoints on the whole distorted image and drops those too close to its border.
    ///
    /// No patches are involved, so this works without a camera.
    pub fn detect(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, Error<F::Error>> {
        check_mask(image, mask)?;
        let mut keypoints = self
            .feature
            .detect(image, mask)
            .map_err(Error::Detector)?;
        self.remove_border_keypoints(image, &mut keypoints);
        Ok(keypoints)
    }

    /// Describes `keypoints` of the distorted `image`, each in the undistorted view of the
    /// patch responsible for it.
    ///
    /// Keypoints that no patch is responsible for, or that cannot be moved into their patch,
    /// are dropped. The returned keypoints keep their original positions, are ordered by
    /// patch, and all carry the `class_id` of the first keypoint a patch is responsible for.
    pub fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<F::Descriptor>), Error<F::Error>> {
        let geometry = self.geometry()?;
        self.check_image(image)?;
        self.describe(geometry, image, keypoints)
    }

    /// Detects and describes keypoints on a distorted image.
    ///
    /// # Arguments
    /// * `image` - The distorted image, the size of the camera.
    /// * `mask` - Optionally, where to detect. Must be the size of `image`.
    /// * `keypoints` - Keypoints to start from, only used if `use_provided_keypoints` is set.
    /// * `use_provided_keypoints` - Skip detection and describe `keypoints` instead. If the
    ///   detector can refine keypoints it gets to do so first, otherwise they are used as is.
    ///
    /// Returns the keypoints in original image coordinates and one descriptor row for each.
    pub fn detect_and_compute(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
        keypoints: Vec<KeyPoint>,
        use_provided_keypoints: bool,
    ) -> Result<(Vec<KeyPoint>, Array2<F::Descriptor>), Error<F::Error>> {
        let geometry = self.geometry()?;
        self.check_image(image)?;
        check_mask(image, mask)?;
        let mut keypoints = if use_provided_keypoints {
            match self.feature.keypoint_refiner() {
                Some(refiner) => refiner
                    .refine(image, mask, keypoints)
                    .map_err(Error::Detector)?,
                None => keypoints,
            }
        } else {
            self.feature
                .detect(image, mask)
                .map_err(Error::Detector)?
        };
        let detected = keypoints.len();
        self.remove_border_keypoints(image, &mut keypoints);
        debug!(
            "{} of {} keypoints are clear of the image border",
            keypoints.len(),
            detected
        );
        self.describe(geometry, image, keypoints)
    }

    fn geometry(&self) -> Result<&Geometry, Error<F::Error>> {
        self.geometry.as_ref().ok_or(Error::NotConfigured)
    }

    fn check_image(&self, image: &GrayImage) -> Result<(), Error<F::Error>> {
        let expected = self
            .camera
            .as_ref()
            .map(|camera| (camera.width(), camera.height()))
            .ok_or(Error::NotConfigured)?;
        if image.dimensions() != expected {
            return Err(Error::ImageSize {
                expected,
                actual: image.dimensions(),
            });
        }
        Ok(())
    }

    fn remove_border_keypoints(&self, image: &GrayImage, keypoints: &mut Vec<KeyPoint>) {
        remove_border_keypoints(
            keypoints,
            self.settings.border_scale,
            image.width(),
            image.height(),
        );
    }

    fn describe(
        &self,
        geometry: &Geometry,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<F::Descriptor>), Error<F::Error>> {
        // Each bucket holds the positions in `keypoints` of the keypoints a patch is
        // responsible for, in ascending order. Output shares the class id of the first
        // keypoint any patch is responsible for.
        let mut buckets = vec![Vec::new(); geometry.patches.len()];
        let mut class_id = None;
        for (tag, keypoint) in keypoints.iter().enumerate() {
            match geometry.selection.patch_at(keypoint.point) {
                Some(patch) => {
                    class_id.get_or_insert(keypoint.class_id);
                    buckets[patch].push(tag);
                }
                None => trace!("No patch is responsible for keypoint at {:?}.", keypoint.point),
            }
        }
        let Some(class_id) = class_id else {
            return Ok((Vec::new(), concatenate(&[])?));
        };

        let mut output = Vec::new();
        let mut blocks = Vec::new();
        for (patch, bucket) in geometry.patches.iter().zip(&buckets) {
            if bucket.is_empty() {
                continue;
            }
            let local: Vec<KeyPoint> = bucket
                .iter()
                .filter_map(|&tag| {
                    let moved = patch.undistort_keypoint(&keypoints[tag]);
                    if moved.is_none() {
                        warn!(
                            "dropping keypoint at {:?} which has no position in patch {}",
                            keypoints[tag].point, patch.index
                        );
                    }
                    moved.map(|keypoint| KeyPoint {
                        class_id: tag,
                        ..keypoint
                    })
                })
                .collect();
            if local.is_empty() {
                continue;
            }
            trace!(
                "Describing {} keypoints in patch {}.",
                local.len(),
                patch.index
            );
            let view = patch.undistort_image(image);
            let (described, descriptors) = self
                .feature
                .compute(&view, local)
                .map_err(Error::Detector)?;
            if descriptors.nrows() != described.len() {
                return Err(Error::DescriptorRows {
                    patch: patch.index,
                    rows: descriptors.nrows(),
                    keypoints: described.len(),
                });
            }
            for keypoint in described {
                let tag = keypoint.class_id;
                if bucket.binary_search(&tag).is_err() {
                    return Err(Error::UnknownTag {
                        patch: patch.index,
                        tag,
                    });
                }
                output.push(KeyPoint {
                    point: keypoints[tag].point,
                    class_id,
                    ..keypoint
                });
            }
            if descriptors.nrows() != 0 {
                blocks.push((patch.index, descriptors));
            }
        }

        let descriptors = concatenate(&blocks)?;
        debug!(
            "Described {} of {} keypoints in {} patches",
            output.len(),
            keypoints.len(),
            blocks.len()
        );
        Ok((output, descriptors))
    }
}

impl<F, C> Feature2d for CameraAwareFeature<F, C>
where
    F: Feature2d,
    C: CameraGeometry,
{
    type Descriptor = F::Descriptor;
    type Error = Error<F::Error>;

    fn detect(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, Self::Error> {
        CameraAwareFeature::detect(self, image, mask)
    }

    fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<Self::Descriptor>), Self::Error> {
        CameraAwareFeature::compute(self, image, keypoints)
    }
}

fn check_mask<E>(image: &GrayImage, mask: Option<&GrayImage>) -> Result<(), Error<E>>
where
    E: std::error::Error + 'static,
{
    match mask {
        Some(mask) if mask.dimensions() != image.dimensions() => Err(Error::MaskSize {
            expected: image.dimensions(),
            actual: mask.dimensions(),
        }),
        _ => Ok(()),
    }
}

/// Stacks non-empty descriptor blocks, tagged with their patch, in order.
fn concatenate<D, E>(blocks: &[(usize, Array2<D>)]) -> Result<Array2<D>, Error<E>>
where
    D: Clone,
    E: std::error::Error + 'static,
{
    let Some((_, first)) = blocks.first() else {
        return Array2::from_shape_vec((0, 0), Vec::new()).map_err(Error::Stack);
    };
    let columns = first.ncols();
    if let Some((patch, block)) = blocks.iter().find(|(_, block)| block.ncols() != columns) {
        return Err(Error::DescriptorColumns {
            patch: *patch,
            expected: columns,
            actual: block.ncols(),
        });
    }
    let views: Vec<_> = blocks.iter().map(|(_, block)| block.view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(Error::Stack)
}
