#![allow(dead_code)]

use cv_camera_aware::nalgebra::{Point2, Vector3};
use cv_camera_aware::{CameraGeometry, Feature2d, KeyPoint, RefineKeypoints};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use ndarray::Array2;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init_timed();
}

/// An equidistant fisheye lens, where the distance from the principal point is `f * theta`.
#[derive(Debug, Clone, Copy)]
pub struct Fisheye {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
}

impl Fisheye {
    /// A 320x240 lens with a 2x2 patch grid at the default tolerance.
    pub fn small() -> Self {
        Self {
            width: 320,
            height: 240,
            focal: 160.0,
        }
    }

    fn principal_point(&self) -> Point2<f64> {
        Point2::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

impl CameraGeometry for Fisheye {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn keypoint_to_euclidean(&self, point: Point2<f64>) -> Vector3<f64> {
        let offset = (point - self.principal_point()) / self.focal;
        let theta = offset.norm();
        if theta < 1e-12 {
            return Vector3::z();
        }
        let direction = offset * (theta.sin() / theta);
        Vector3::new(direction.x, direction.y, theta.cos())
    }

    fn euclidean_to_keypoint(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        let rho = ray.xy().norm();
        if rho < 1e-12 {
            return (ray.z > 0.0).then(|| self.principal_point());
        }
        let theta = rho.atan2(ray.z);
        Some(self.principal_point() + ray.xy() * (self.focal * theta / rho))
    }
}

/// An ideal pinhole camera with its principal point in the middle of the image.
#[derive(Debug, Clone, Copy)]
pub struct Pinhole {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
}

impl CameraGeometry for Pinhole {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn keypoint_to_euclidean(&self, point: Point2<f64>) -> Vector3<f64> {
        Vector3::new(
            (point.x - self.width as f64 / 2.0) / self.focal,
            (point.y - self.height as f64 / 2.0) / self.focal,
            1.0,
        )
    }

    fn euclidean_to_keypoint(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        (ray.z > 0.0).then(|| {
            Point2::new(
                ray.x / ray.z * self.focal + self.width as f64 / 2.0,
                ray.y / ray.z * self.focal + self.height as f64 / 2.0,
            )
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("toy detector failed on purpose")]
pub struct ToyError;

/// Finds strict 3x3 maxima and describes them by their 3x3 neighborhood.
#[derive(Debug, Clone, Copy, Default)]
pub struct Toy {
    /// Fail every call.
    pub fail: bool,
    /// Expose a keypoint refiner which marks keypoints with octave 1.
    pub refine: bool,
}

pub const TOY_THRESHOLD: u8 = 100;
pub const TOY_SIZE: f32 = 3.0;

impl Feature2d for Toy {
    type Descriptor = u8;
    type Error = ToyError;

    fn detect(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, ToyError> {
        if self.fail {
            return Err(ToyError);
        }
        let mut keypoints = vec![];
        for y in 1..image.height().saturating_sub(1) {
            for x in 1..image.width().saturating_sub(1) {
                if mask.map_or(false, |mask| mask.get_pixel(x, y)[0] == 0) {
                    continue;
                }
                let value = image.get_pixel(x, y)[0];
                if value < TOY_THRESHOLD {
                    continue;
                }
                let is_max = (-1i32..=1)
                    .flat_map(|dy| (-1i32..=1).map(move |dx| (dx, dy)))
                    .filter(|&offset| offset != (0, 0))
                    .all(|(dx, dy)| {
                        image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] < value
                    });
                if is_max {
                    keypoints.push(KeyPoint {
                        response: value as f32,
                        ..KeyPoint::new((x as f32, y as f32), TOY_SIZE)
                    });
                }
            }
        }
        Ok(keypoints)
    }

    fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<u8>), ToyError> {
        if self.fail {
            return Err(ToyError);
        }
        let mut kept = vec![];
        let mut data = vec![];
        for keypoint in keypoints {
            let (x, y) = (keypoint.point.0.round(), keypoint.point.1.round());
            if x < 1.0 || y < 1.0 || x + 1.0 >= image.width() as f32 || y + 1.0 >= image.height() as f32 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            for dy in 0..3 {
                for dx in 0..3 {
                    data.push(image.get_pixel(x + dx - 1, y + dy - 1)[0]);
                }
            }
            kept.push(keypoint);
        }
        let descriptors = Array2::from_shape_vec((kept.len(), 9), data).unwrap();
        Ok((kept, descriptors))
    }

    fn keypoint_refiner(&self) -> Option<&dyn RefineKeypoints<Error = ToyError>> {
        if self.refine {
            Some(self)
        } else {
            None
        }
    }
}

impl RefineKeypoints for Toy {
    type Error = ToyError;

    fn refine(
        &self,
        _image: &GrayImage,
        _mask: Option<&GrayImage>,
        keypoints: Vec<KeyPoint>,
    ) -> Result<Vec<KeyPoint>, ToyError> {
        Ok(keypoints
            .into_iter()
            .map(|keypoint| KeyPoint {
                octave: 1,
                ..keypoint
            })
            .collect())
    }
}

/// How [`Faulty`] breaks the contract of [`Feature2d::compute`].
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Return one descriptor row more than there are keypoints.
    ExtraRow,
    /// Return keypoints with a class id that was never handed out.
    Retag(usize),
}

/// The [`Toy`] detector with a broken `compute`.
#[derive(Debug, Clone, Copy)]
pub struct Faulty(pub Fault);

impl Feature2d for Faulty {
    type Descriptor = u8;
    type Error = ToyError;

    fn detect(
        &self,
        image: &GrayImage,
        mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, ToyError> {
        Toy::default().detect(image, mask)
    }

    fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<u8>), ToyError> {
        let (keypoints, descriptors) = Toy::default().compute(image, keypoints)?;
        Ok(match self.0 {
            Fault::ExtraRow => {
                let rows = descriptors.nrows() + 1;
                (keypoints, Array2::zeros((rows, descriptors.ncols())))
            }
            Fault::Retag(class_id) => {
                let keypoints = keypoints
                    .into_iter()
                    .map(|keypoint| KeyPoint {
                        class_id,
                        ..keypoint
                    })
                    .collect();
                (keypoints, descriptors)
            }
        })
    }
}

/// Gaussian blobs on a regular grid, each with a single brightest pixel.
pub fn blobs(width: u32, height: u32, spacing: u32) -> GrayImage {
    let sigma = 2.0f32;
    GrayImage::from_fn(width, height, |x, y| {
        let dx = (x % spacing) as f32 - (spacing / 2) as f32;
        let dy = (y % spacing) as f32 - (spacing / 2) as f32;
        let value = 255.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        Luma([value.round() as u8])
    })
}

/// A mask that only allows detection inside of `rect`.
pub fn rect_mask(width: u32, height: u32, rect: Rect) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    draw_filled_rect_mut(&mut mask, rect, Luma([255]));
    mask
}
