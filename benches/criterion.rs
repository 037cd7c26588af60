use criterion::{criterion_group, criterion_main, Criterion};
use cv_camera_aware::nalgebra::{Point2, Vector3};
use cv_camera_aware::{CameraAwareFeature, CameraGeometry, Feature2d, KeyPoint};
use image::{GrayImage, Luma};
use ndarray::Array2;

/// An equidistant fisheye lens.
struct Fisheye;

impl CameraGeometry for Fisheye {
    fn width(&self) -> u32 {
        640
    }

    fn height(&self) -> u32 {
        480
    }

    fn keypoint_to_euclidean(&self, point: Point2<f64>) -> Vector3<f64> {
        let offset = (point - Point2::new(320.0, 240.0)) / 300.0;
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
            return Some(Point2::new(320.0, 240.0));
        }
        let theta = rho.atan2(ray.z);
        Some(Point2::new(320.0, 240.0) + ray.xy() * (300.0 * theta / rho))
    }
}

/// Keypoints on a fixed grid described by their pixel value.
struct Grid;

impl Feature2d for Grid {
    type Descriptor = u8;
    type Error = std::convert::Infallible;

    fn detect(
        &self,
        image: &GrayImage,
        _mask: Option<&GrayImage>,
    ) -> Result<Vec<KeyPoint>, Self::Error> {
        Ok((0..image.height())
            .step_by(8)
            .flat_map(|y| (0..image.width()).step_by(8).map(move |x| (x, y)))
            .map(|(x, y)| KeyPoint::new((x as f32, y as f32), 2.0))
            .collect())
    }

    fn compute(
        &self,
        image: &GrayImage,
        keypoints: Vec<KeyPoint>,
    ) -> Result<(Vec<KeyPoint>, Array2<u8>), Self::Error> {
        let keypoints: Vec<KeyPoint> = keypoints
            .into_iter()
            .filter(|keypoint| keypoint.is_inside(1.0, image.width(), image.height()))
            .collect();
        let descriptors = Array2::from_shape_fn((keypoints.len(), 1), |(i, _)| {
            let (x, y) = keypoints[i].point;
            image.get_pixel(x as u32, y as u32)[0]
        });
        Ok((keypoints, descriptors))
    }
}

fn configure(c: &mut Criterion) {
    c.bench_function("configure", |b| {
        b.iter(|| CameraAwareFeature::new(Grid, Fisheye, 0.5).unwrap())
    });
}

fn detect_and_compute(c: &mut Criterion) {
    let feature = CameraAwareFeature::new(Grid, Fisheye, 0.5).unwrap();
    let image = GrayImage::from_fn(640, 480, |x, y| Luma([((x ^ y) & 0xff) as u8]));
    c.bench_function("detect_and_compute", |b| {
        b.iter(|| {
            feature
                .detect_and_compute(&image, None, vec![], false)
                .unwrap()
        })
    });
}

criterion_group!(
    name = camera_aware;
    config = Criterion::default().sample_size(10);
    targets = configure, detect_and_compute
);

criterion_main!(camera_aware);
