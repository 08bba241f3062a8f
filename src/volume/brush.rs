//! Brush geometry: cuboid voxel blocks centred on a cursor voxel.

use ndarray::Array3;

use super::region::Region;

/// Fractional bounds this close to an integer are snapped onto it.
const SNAP: f64 = 1e-9;

/// Which side of the cursor gets the extra voxel when a box with an even
/// number of voxels cannot be centred exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    /// Extra voxel goes below the cursor.
    Low,
    /// Extra voxel goes above the cursor.
    #[default]
    High,
    /// Grow the box to an odd size so the cursor sits in the centre.
    Centre,
}

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP {
        r
    } else {
        v
    }
}

/// Region of a box of side `box_size` (world units) centred on `voxel`.
///
/// Axes not listed in `axes` are one voxel thick, which makes a 2D square
/// on the plane spanned by `axes`. Every axis is at least one voxel wide.
/// The box is cropped to the image extent; `None` if nothing remains.
pub fn voxel_box(
    voxel: [usize; 3],
    extent: [usize; 3],
    pixdim: [f64; 3],
    box_size: f64,
    axes: &[usize],
    bias: Bias,
) -> Option<Region> {
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];

    for i in 0..3 {
        let size = if axes.contains(&i) { box_size } else { pixdim[i] };
        let half = size.max(pixdim[i]) / (2.0 * pixdim[i]);

        // Voxel coordinates name voxel centres
        let centre = voxel[i] as f64 + 0.5;
        let (l, h) = (snap(centre - half), snap(centre + half));

        let (l, h) = match bias {
            Bias::Low => (l.floor(), h.floor()),
            Bias::High => (l.ceil(), h.ceil()),
            Bias::Centre => (l.floor(), h.ceil()),
        };

        lo[i] = l.max(0.0) as usize;
        hi[i] = (h.max(0.0) as usize).min(extent[i]);
        if hi[i] <= lo[i] {
            return None;
        }
    }

    Some(Region::from_bounds(lo, hi))
}

/// A block of ones covering [`voxel_box`], with its offset.
pub fn voxel_block(
    voxel: [usize; 3],
    extent: [usize; 3],
    pixdim: [f64; 3],
    box_size: f64,
    axes: &[usize],
    bias: Bias,
) -> Option<(Array3<f32>, [usize; 3])> {
    let region = voxel_box(voxel, extent, pixdim, box_size, axes, bias)?;
    Some((Array3::ones(region.shape), region.offset))
}
