use crate::remap::GrayBuffer;
use crate::Patch;
use derive_more::{Deref, DerefMut};
use image::ImageBuffer;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// For every pixel of the original image, the label of the one patch responsible for it.
///
/// A value of `0` means no patch claimed the pixel, and `i + 1` means patch `i` did.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct SelectionMap(pub GrayBuffer<u16>);

impl SelectionMap {
    /// Combines the claims of every patch with an elementwise maximum.
    ///
    /// If two patches claim the same pixel the one with the higher index wins.
    pub fn build(patches: &[Patch], (width, height): (u32, u32)) -> Self {
        let empty = || ImageBuffer::new(width, height);
        #[cfg(not(feature = "rayon"))]
        let map = patches
            .iter()
            .map(Patch::claims)
            .fold(empty(), |map, claims| merge(map, &claims));
        #[cfg(feature = "rayon")]
        let map = patches
            .par_iter()
            .map(Patch::claims)
            .reduce(empty, |map, claims| merge(map, &claims));
        Self(map)
    }

    /// The index of the patch responsible for the pixel containing `point`.
    ///
    /// Returns `None` outside of the image or where no patch is responsible.
    pub fn patch_at(&self, (x, y): (f32, f32)) -> Option<usize> {
        if !(x >= 0.0 && y >= 0.0) {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.width() || y >= self.height() {
            return None;
        }
        match self.get_pixel(x, y)[0] {
            0 => None,
            label => Some(label as usize - 1),
        }
    }

    /// The number of pixels no patch is responsible for.
    pub fn unassigned(&self) -> usize {
        self.pixels().filter(|p| p[0] == 0).count()
    }
}

fn merge(mut map: GrayBuffer<u16>, claims: &GrayBuffer<u16>) -> GrayBuffer<u16> {
    for (pixel, claim) in map.pixels_mut().zip(claims.pixels()) {
        pixel[0] = pixel[0].max(claim[0]);
    }
    map
}
