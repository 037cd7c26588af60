//! Dense pixel lookup tables and resampling through them.
//!
//! A [`RemapTable`] stores, for every destination pixel, the floating point source pixel
//! to sample. Each table also carries a fixed point copy in which every entry is an
//! integer source pixel plus a sub-pixel weight index with [`INTER_BITS`] bits per axis.
//! Resampling through the fixed point table needs no per-pixel floor or fraction and
//! blends integer pixels with integer weights that sum to 1024. It agrees with the
//! floating point path up to 1/64 of a pixel in position.

use cv_core::nalgebra::Point2;
use image::{ImageBuffer, Luma, Primitive};
use ndarray::Array2;
use num_traits::NumCast;

/// Sub-pixel bits per axis in the fixed point encoding.
pub const INTER_BITS: u32 = 5;
/// Number of sub-pixel positions per axis.
pub const INTER_TAB_SIZE: i32 = 1 << INTER_BITS;
/// Bilinear weights in the fixed point path sum to `1 << WEIGHT_BITS`.
const WEIGHT_BITS: u32 = 2 * INTER_BITS;

/// Source coordinate used in the fixed point table for entries with no valid source.
const INVALID: i16 = i16::MIN;

/// A single channel image with arbitrary primitive pixels.
pub type GrayBuffer<T> = ImageBuffer<Luma<T>, Vec<T>>;

/// What to sample when a tap falls outside of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// Outside taps read as zero.
    Constant,
    /// Outside taps read the nearest edge pixel.
    Replicate,
}

/// The integer half of a fixed point remap table.
#[derive(Debug, Clone)]
pub struct FixedPointMap {
    /// Integer source pixel `(x, y)` of each destination pixel.
    pub coords: Array2<[i16; 2]>,
    /// Sub-pixel position as `fy * INTER_TAB_SIZE + fx`.
    pub weights: Array2<u16>,
}

impl FixedPointMap {
    /// Encodes a pair of floating point coordinate maps.
    ///
    /// Non-finite entries are marked invalid and always sample as zero.
    pub fn from_float(map_x: &Array2<f32>, map_y: &Array2<f32>) -> Self {
        assert_eq!(map_x.dim(), map_y.dim(), "coordinate maps differ in shape");
        let mut coords = Array2::from_elem(map_x.dim(), [INVALID; 2]);
        let mut weights = Array2::zeros(map_x.dim());
        ndarray::Zip::from(&mut coords)
            .and(&mut weights)
            .and(map_x)
            .and(map_y)
            .for_each(|coord, weight, &x, &y| {
                if let Some((c, w)) = encode(x, y) {
                    *coord = c;
                    *weight = w;
                }
            });
        Self { coords, weights }
    }

    /// Destination `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        let (rows, cols) = self.coords.dim();
        (cols as u32, rows as u32)
    }
}

fn encode(x: f32, y: f32) -> Option<([i16; 2], u16)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let scale = INTER_TAB_SIZE as f32;
    // Saturating float to int casts keep far away coordinates far away.
    let ix = (x * scale).round() as i32;
    let iy = (y * scale).round() as i32;
    let clamp = |v: i32| (v >> INTER_BITS).clamp(INVALID as i32 + 1, i16::MAX as i32) as i16;
    let fx = (ix & (INTER_TAB_SIZE - 1)) as u16;
    let fy = (iy & (INTER_TAB_SIZE - 1)) as u16;
    Some(([clamp(ix), clamp(iy)], fy * INTER_TAB_SIZE as u16 + fx))
}

/// The bilinear weights of a fixed point sub-pixel index, in `[w00, w10, w01, w11]` order.
pub fn fixed_weights(weight: u16) -> [u32; 4] {
    let size = INTER_TAB_SIZE as u32;
    let fx = weight as u32 % size;
    let fy = weight as u32 / size;
    [
        (size - fx) * (size - fy),
        fx * (size - fy),
        (size - fx) * fy,
        fx * fy,
    ]
}

/// A dense floating point lookup table together with its fixed point encoding.
#[derive(Debug, Clone)]
pub struct RemapTable {
    pub map_x: Array2<f32>,
    pub map_y: Array2<f32>,
    pub fixed: FixedPointMap,
}

impl RemapTable {
    pub fn new(map_x: Array2<f32>, map_y: Array2<f32>) -> Self {
        let fixed = FixedPointMap::from_float(&map_x, &map_y);
        Self {
            map_x,
            map_y,
            fixed,
        }
    }

    /// Destination `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.fixed.size()
    }

    /// The table entry at an integer destination pixel.
    pub fn get(&self, x: usize, y: usize) -> Option<Point2<f32>> {
        let point = Point2::new(*self.map_x.get((y, x))?, *self.map_y.get((y, x))?);
        (point.x.is_finite() && point.y.is_finite()).then_some(point)
    }

    /// Bilinearly interpolates the table at a sub-pixel destination position.
    ///
    /// Uses the four entries around `point` (the `+1` neighbors are clamped to the last
    /// row and column). Returns `None` outside of the table or where an entry is invalid.
    pub fn interpolate(&self, point: Point2<f32>) -> Option<Point2<f32>> {
        let (rows, cols) = self.map_x.dim();
        if !(point.x >= 0.0 && point.y >= 0.0) {
            return None;
        }
        let (x0, y0) = (point.x as usize, point.y as usize);
        if x0 >= cols || y0 >= rows {
            return None;
        }
        let (rx, ry) = (point.x - x0 as f32, point.y - y0 as f32);
        let (x1, y1) = ((x0 + 1).min(cols - 1), (y0 + 1).min(rows - 1));
        let p00 = self.get(x0, y0)?;
        let p10 = self.get(x1, y0)?;
        let p01 = self.get(x0, y1)?;
        let p11 = self.get(x1, y1)?;
        let top = p00 + (p10 - p00) * rx;
        let bottom = p01 + (p11 - p01) * rx;
        Some(top + (bottom - top) * ry)
    }

    /// Resamples `src` through the fixed point table.
    pub fn remap<T>(&self, src: &GrayBuffer<T>, border: Border) -> GrayBuffer<T>
    where
        T: Primitive,
    {
        remap_fixed(src, &self.fixed, border)
    }

    /// Resamples `src` through the floating point table with bilinear interpolation.
    pub fn remap_float<T>(&self, src: &GrayBuffer<T>, border: Border) -> GrayBuffer<T>
    where
        T: Primitive,
    {
        let (width, height) = self.size();
        Sampler::new(src, border).resample(width, height, |x, y| {
            let sx = self.map_x[(y, x)];
            let sy = self.map_y[(y, x)];
            if !sx.is_finite() || !sy.is_finite() {
                return None;
            }
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            Some((
                [x0 as i64, y0 as i64],
                [
                    (1.0 - fx) * (1.0 - fy),
                    fx * (1.0 - fy),
                    (1.0 - fx) * fy,
                    fx * fy,
                ],
            ))
        })
    }
}

/// Resamples `src` through a fixed point table using its quantized bilinear weights.
///
/// Taps are blended in integer arithmetic and rounded to the nearest value.
pub fn remap_fixed<T>(src: &GrayBuffer<T>, map: &FixedPointMap, border: Border) -> GrayBuffer<T>
where
    T: Primitive,
{
    let (width, height) = map.size();
    let sampler = Sampler::new(src, border);
    let max = T::DEFAULT_MAX_VALUE.to_u64().unwrap_or(u64::MAX);
    let half = 1u64 << (WEIGHT_BITS - 1);
    ImageBuffer::from_fn(width, height, |x, y| {
        let [sx, sy] = map.coords[(y as usize, x as usize)];
        if sx == INVALID || sy == INVALID {
            return Luma([T::zero()]);
        }
        let weights = fixed_weights(map.weights[(y as usize, x as usize)]);
        let sum: u64 = sampler
            .taps(sx as i64, sy as i64)
            .iter()
            .zip(weights)
            .map(|(tap, weight)| tap.to_u64().unwrap_or(0) * weight as u64)
            .sum();
        let value = ((sum + half) >> WEIGHT_BITS).min(max);
        Luma([NumCast::from(value).unwrap_or_else(T::zero)])
    })
}

struct Sampler<'a, T: Primitive> {
    src: &'a GrayBuffer<T>,
    border: Border,
}

impl<'a, T: Primitive> Sampler<'a, T> {
    fn new(src: &'a GrayBuffer<T>, border: Border) -> Self {
        Self { src, border }
    }

    fn tap(&self, x: i64, y: i64) -> T {
        let (width, height) = (self.src.width() as i64, self.src.height() as i64);
        if width == 0 || height == 0 {
            return T::zero();
        }
        let inside = (0..width).contains(&x) && (0..height).contains(&y);
        let (x, y) = match (inside, self.border) {
            (true, _) => (x, y),
            (false, Border::Constant) => return T::zero(),
            (false, Border::Replicate) => (x.clamp(0, width - 1), y.clamp(0, height - 1)),
        };
        self.src.get_pixel(x as u32, y as u32)[0]
    }

    /// The 2x2 source taps starting at `(x, y)` in `[t00, t10, t01, t11]` order.
    fn taps(&self, x: i64, y: i64) -> [T; 4] {
        [
            self.tap(x, y),
            self.tap(x + 1, y),
            self.tap(x, y + 1),
            self.tap(x + 1, y + 1),
        ]
    }

    /// Builds a `width` by `height` image where each pixel blends the 2x2 source taps
    /// starting at the position `source` returns for it.
    fn resample(
        &self,
        width: u32,
        height: u32,
        source: impl Fn(usize, usize) -> Option<([i64; 2], [f32; 4])>,
    ) -> GrayBuffer<T> {
        let max = T::DEFAULT_MAX_VALUE.to_f32().unwrap_or(f32::MAX);
        ImageBuffer::from_fn(width, height, |x, y| {
            let value = source(x as usize, y as usize)
                .map(|([sx, sy], weights)| {
                    self.taps(sx, sy)
                        .iter()
                        .zip(weights)
                        .map(|(tap, weight)| tap.to_f32().unwrap_or(0.0) * weight)
                        .sum::<f32>()
                })
                .unwrap_or(0.0);
            Luma([NumCast::from(value.round().clamp(0.0, max)).unwrap_or_else(T::zero)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn ramp(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([(x * 10 + y * 3) as u8]))
    }

    fn shifted_table(width: usize, height: usize, dx: f32, dy: f32) -> RemapTable {
        RemapTable::new(
            Array2::from_shape_fn((height, width), |(_, x)| x as f32 + dx),
            Array2::from_shape_fn((height, width), |(y, _)| y as f32 + dy),
        )
    }

    #[test]
    fn fixed_weights_sum_to_one() {
        for weight in 0..(INTER_TAB_SIZE * INTER_TAB_SIZE) as u16 {
            assert_eq!(fixed_weights(weight).iter().sum::<u32>(), 1 << WEIGHT_BITS);
        }
    }

    #[test]
    fn encoding_splits_integer_and_fraction() {
        let (coords, weight) = encode(3.25, 7.5).unwrap();
        assert_eq!(coords, [3, 7]);
        assert_eq!(weight, 16 * INTER_TAB_SIZE as u16 + 8);
        let (coords, weight) = encode(-0.25, 2.0).unwrap();
        assert_eq!(coords, [-1, 2]);
        assert_eq!(weight, 24);
        assert_eq!(encode(f32::NAN, 1.0), None);
    }

    #[test]
    fn identity_table_reproduces_image() {
        let src = ramp(12, 9);
        let table = shifted_table(12, 9, 0.0, 0.0);
        assert_eq!(table.remap(&src, Border::Constant), src);
        assert_eq!(table.remap_float(&src, Border::Constant), src);
    }

    #[test]
    fn fixed_and_float_paths_agree() {
        let src = ramp(20, 15);
        let table = RemapTable::new(
            Array2::from_shape_fn((15, 20), |(y, x)| x as f32 * 0.9 + y as f32 * 0.07 + 0.3),
            Array2::from_shape_fn((15, 20), |(y, x)| y as f32 * 0.9 + x as f32 * 0.03 + 0.2),
        );
        let fixed = table.remap(&src, Border::Constant);
        let float = table.remap_float(&src, Border::Constant);
        for (a, b) in fixed.pixels().zip(float.pixels()) {
            assert!((a[0] as i32 - b[0] as i32).abs() <= 1, "{} vs {}", a[0], b[0]);
        }
    }

    #[test]
    fn fixed_blend_rounds_in_integers() {
        let src = GrayBuffer::<u16>::from_fn(2, 1, |x, _| Luma([[60001, 1000][x as usize]]));
        let table = RemapTable::new(Array2::from_elem((1, 1), 0.5), Array2::zeros((1, 1)));
        assert_eq!(table.remap(&src, Border::Replicate).get_pixel(0, 0)[0], 30501);
        let src = GrayImage::from_fn(2, 1, |x, _| Luma([[100, 201][x as usize]]));
        assert_eq!(table.remap(&src, Border::Replicate).get_pixel(0, 0)[0], 151);
        let quarter = RemapTable::new(Array2::from_elem((1, 1), 0.25), Array2::zeros((1, 1)));
        // 0.75 * 100 + 0.25 * 201 = 125.25
        assert_eq!(quarter.remap(&src, Border::Replicate).get_pixel(0, 0)[0], 125);
    }

    #[test]
    fn borders() {
        let src = GrayImage::from_pixel(4, 4, Luma([200]));
        let table = shifted_table(4, 4, 2.5, 0.0);
        let constant = table.remap(&src, Border::Constant);
        let replicate = table.remap(&src, Border::Replicate);
        assert_eq!(constant.get_pixel(0, 0)[0], 200);
        assert_eq!(constant.get_pixel(1, 0)[0], 100);
        assert_eq!(constant.get_pixel(2, 0)[0], 0);
        assert!(replicate.pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn invalid_entries_sample_zero() {
        let src = GrayImage::from_pixel(4, 4, Luma([200]));
        let mut map_x = Array2::from_elem((2, 2), 1.0f32);
        map_x[(0, 1)] = f32::NAN;
        let table = RemapTable::new(map_x, Array2::from_elem((2, 2), 1.0f32));
        let out = table.remap(&src, Border::Replicate);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 200);
        assert_eq!(table.interpolate(Point2::new(0.5, 0.0)), None);
    }

    #[test]
    fn interpolation_is_bilinear() {
        let table = RemapTable::new(
            Array2::from_shape_fn((3, 3), |(y, x)| (x * x + y) as f32),
            Array2::from_shape_fn((3, 3), |(y, x)| (x + 2 * y) as f32),
        );
        let p = table.interpolate(Point2::new(1.5, 0.25)).unwrap();
        // x: rows 0 and 1 give 2.5 and 3.5, blended by 0.25.
        assert!((p.x - 2.75).abs() < 1e-6);
        assert!((p.y - 2.0).abs() < 1e-6);
        assert_eq!(table.interpolate(Point2::new(3.0, 0.0)), None);
        assert_eq!(table.interpolate(Point2::new(-0.1, 0.0)), None);
        // The last column has no right neighbor and is used as is.
        assert_eq!(table.interpolate(Point2::new(2.0, 2.0)), Some(Point2::new(6.0, 6.0)));
    }
}
