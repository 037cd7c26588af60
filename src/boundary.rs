//! The extent of each patch's undistorted view.
//!
//! Interior corners of a patch are where its plane meets the planes of two of its
//! neighbors. Sides on the border of the original image are traced pixel by pixel instead.

use crate::{CameraGeometry, PatchGrid};
use cv_core::nalgebra::{Point2, Rotation3, Vector2, Vector3};
use log::*;

/// Triple products smaller than this have no stable three-plane intersection.
pub const COPLANAR_EPSILON: f64 = 1e-12;

/// Points closer than this to the plane `z = 0` of a patch cannot be projected onto it.
const BEHIND_EPSILON: f64 = 1e-9;

/// Which sides of a patch lie on the border of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageEdges {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl ImageEdges {
    pub fn of(grid: &PatchGrid, m: usize, n: usize) -> Self {
        Self {
            left: m == 0,
            right: m + 1 == grid.cols,
            top: n == 0,
            bottom: n + 1 == grid.rows,
        }
    }
}

/// The four corners of a patch on its own `z = 1` plane.
///
/// Coordinates that are never constrained stay at zero, which is where the patch's own
/// center ray crosses the plane and therefore always inside of the patch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Corners {
    pub top_left: Vector2<f64>,
    pub top_right: Vector2<f64>,
    pub bottom_left: Vector2<f64>,
    pub bottom_right: Vector2<f64>,
}

impl Corners {
    pub fn left(&self) -> f64 {
        self.top_left.x.min(self.bottom_left.x)
    }

    pub fn right(&self) -> f64 {
        self.top_right.x.max(self.bottom_right.x)
    }

    pub fn top(&self) -> f64 {
        self.top_left.y.min(self.top_right.y)
    }

    pub fn bottom(&self) -> f64 {
        self.bottom_left.y.max(self.bottom_right.y)
    }
}

/// The undistorted view of a patch: where its plane origin lands in pixels and how
/// many pixels it spans, margins included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    /// Pixel coordinate `(cu, cv)` of the patch's center ray.
    pub center: (f64, f64),
    pub width: f64,
    pub height: f64,
}

impl Extent {
    /// Converts plane corners to pixels with `focal_length`, adding `margin` pixels to
    /// each side that faces another patch.
    pub fn new(corners: &Corners, edges: ImageEdges, focal_length: f64, margin: u32) -> Self {
        let margin = margin as f64;
        let pad = |on_edge: bool| if on_edge { 0.0 } else { margin };
        let cu = -corners.left() * focal_length + pad(edges.left);
        let cv = -corners.top() * focal_length + pad(edges.top);
        Self {
            center: (cu, cv),
            width: cu + corners.right() * focal_length + pad(edges.right),
            height: cv + corners.bottom() * focal_length + pad(edges.bottom),
        }
    }
}

/// Intersects the planes `n_i · p + d_i = 0`.
///
/// Returns `None` if the normals are (nearly) coplanar.
pub fn three_plane_intersection(
    n1: &Vector3<f64>,
    d1: f64,
    n2: &Vector3<f64>,
    d2: f64,
    n3: &Vector3<f64>,
    d3: f64,
) -> Option<Vector3<f64>> {
    let n2_n3 = n2.cross(n3);
    let denom = n1.dot(&n2_n3);
    if denom.abs() < COPLANAR_EPSILON {
        return None;
    }
    Some((n2_n3 * d1 + n3.cross(n1) * d2 + n1.cross(n2) * d3) / -denom)
}

/// Rotates `ray` into a patch frame and projects it onto the `z = 1` plane.
fn onto_plane(rotation: &Rotation3<f64>, ray: &Vector3<f64>) -> Option<Vector2<f64>> {
    let local = rotation * ray;
    (local.z > BEHIND_EPSILON).then(|| local.xy() / local.z)
}

/// Finds the corners of patch `(m, n)` whose camera-to-patch rotation is `rotation`.
pub fn trace_corners(
    camera: &impl CameraGeometry,
    grid: &PatchGrid,
    m: usize,
    n: usize,
    rotation: &Rotation3<f64>,
) -> Corners {
    let edges = ImageEdges::of(grid, m, n);
    let i = grid.index(m, n);
    let (x0, y0, x1, y1) = grid.bin(m, n);
    let mut corners = Corners::default();

    let bin_corner = |(x, y): (f64, f64)| {
        let ray = camera.keypoint_to_euclidean(Point2::new(x, y));
        onto_plane(rotation, &ray).unwrap_or_else(Vector2::zeros)
    };

    // Where the patch meets two neighbors. If the planes do not intersect stably we use
    // the matching corner of the patch's bin in the original image instead.
    let meet = |a: usize, b: usize, fallback: (f64, f64)| -> Vector2<f64> {
        three_plane_intersection(
            &grid.centers[i],
            -1.0,
            &grid.centers[a],
            -1.0,
            &grid.centers[b],
            -1.0,
        )
        .and_then(|point| onto_plane(rotation, &point))
        .unwrap_or_else(|| {
            warn!(
                "patch {} has no stable corner with patches {} and {}, using bin corner {:?}",
                i, a, b, fallback
            );
            bin_corner(fallback)
        })
    };

    if !edges.left && !edges.top {
        corners.top_left = meet(i - 1, i - grid.cols, (x0, y0));
    }
    if !edges.top && !edges.right {
        corners.top_right = meet(i - grid.cols, i + 1, (x1, y0));
    }
    if !edges.left && !edges.bottom {
        corners.bottom_left = meet(i - 1, i + grid.cols, (x0, y1));
    }
    if !edges.right && !edges.bottom {
        corners.bottom_right = meet(i + 1, i + grid.cols, (x1, y1));
    }

    // The planes of patch `i` and neighbor `j` meet on the line `s · (x, y, 1) = 0` of the
    // patch plane. `vertical` neighbors are above or below, and `along` is the coordinate
    // along the side, `x` for vertical neighbors and `y` otherwise.
    let seam = |j: usize, vertical: bool, along: f64, fallback: (f64, f64)| -> f64 {
        let s = rotation * (grid.centers[i] - grid.centers[j]);
        let (normal, other) = if vertical { (s.y, s.x) } else { (s.x, s.y) };
        if normal.abs() >= COPLANAR_EPSILON {
            let value = -(other * along + s.z) / normal;
            if value.is_finite() {
                return value;
            }
        }
        warn!(
            "patch {} has no stable seam with patch {}, using bin corner {:?}",
            i, j, fallback
        );
        let corner = bin_corner(fallback);
        if vertical {
            corner.y
        } else {
            corner.x
        }
    };
    // A side facing a neighbor ends where its seam crosses the image border.
    let place_on_seams = |corners: &mut Corners| {
        if !edges.left {
            if edges.top {
                corners.top_left.x = seam(i - 1, false, corners.top_left.y, (x0, y0));
            }
            if edges.bottom {
                corners.bottom_left.x = seam(i - 1, false, corners.bottom_left.y, (x0, y1));
            }
        }
        if !edges.right {
            if edges.top {
                corners.top_right.x = seam(i + 1, false, corners.top_right.y, (x1, y0));
            }
            if edges.bottom {
                corners.bottom_right.x = seam(i + 1, false, corners.bottom_right.y, (x1, y1));
            }
        }
        if !edges.top {
            if edges.left {
                corners.top_left.y = seam(i - grid.cols, true, corners.top_left.x, (x0, y0));
            }
            if edges.right {
                corners.top_right.y = seam(i - grid.cols, true, corners.top_right.x, (x1, y0));
            }
        }
        if !edges.bottom {
            if edges.left {
                corners.bottom_left.y =
                    seam(i + grid.cols, true, corners.bottom_left.x, (x0, y1));
            }
            if edges.right {
                corners.bottom_right.y =
                    seam(i + grid.cols, true, corners.bottom_right.x, (x1, y1));
            }
        }
    };
    // First through the center ray, which bounds the traced sides, then through the
    // traced border.
    place_on_seams(&mut corners);

    let (width, height) = (grid.image_size.0 as f64, grid.image_size.1 as f64);
    let border = |x: f64, y: f64| {
        let ray = camera.keypoint_to_euclidean(Point2::new(x, y));
        onto_plane(rotation, &ray)
    };
    // Only the part of a traced side between the neighboring corners counts.
    let within_rows = |p: &Vector2<f64>, corners: &Corners| {
        (edges.top || p.y >= corners.top()) && (edges.bottom || p.y <= corners.bottom())
    };
    let within_cols = |p: &Vector2<f64>, corners: &Corners| {
        (edges.left || p.x >= corners.left()) && (edges.right || p.x <= corners.right())
    };

    if edges.left {
        for y in 0..grid.image_size.1 {
            let Some(p) = border(0.0, y as f64) else { continue };
            if within_rows(&p, &corners) && p.x < corners.top_left.x {
                corners.top_left.x = p.x;
                corners.bottom_left.x = p.x;
            }
        }
    }
    if edges.right {
        for y in 0..grid.image_size.1 {
            let Some(p) = border(width, y as f64) else { continue };
            if within_rows(&p, &corners) && p.x > corners.top_right.x {
                corners.top_right.x = p.x;
                corners.bottom_right.x = p.x;
            }
        }
    }
    if edges.top {
        for x in 0..grid.image_size.0 {
            let Some(p) = border(x as f64, 0.0) else { continue };
            if within_cols(&p, &corners) && p.y < corners.top_left.y {
                corners.top_left.y = p.y;
                corners.top_right.y = p.y;
            }
        }
    }
    if edges.bottom {
        for x in 0..grid.image_size.0 {
            let Some(p) = border(x as f64, height) else { continue };
            if within_cols(&p, &corners) && p.y > corners.bottom_left.y {
                corners.bottom_left.y = p.y;
                corners.bottom_right.y = p.y;
            }
        }
    }
    place_on_seams(&mut corners);

    corners
}
