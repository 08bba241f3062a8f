//! Select-by-value region growing.
//!
//! Selects voxels whose value lies within a tolerance of a seed voxel's
//! value, optionally limited to a radius around the seed and optionally
//! restricted to voxels connected to the seed.

use std::collections::VecDeque;

use log::debug;
use ndarray::{Array3, ArrayView3, Zip};

use crate::error::{EditError, Result};
use crate::volume::{dims, Region};

/// Parameters of one select-by-value call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowParams {
    /// Values within `seed ± precision` (inclusive) are selected.
    /// Negative values are treated as 0.
    pub precision: f32,
    /// Radius in world units. Converted per axis to `radius / pixdim`
    /// voxels, so the search region is an axis-aligned ellipsoid in voxel
    /// space.
    pub search_radius: Option<f64>,
    /// Only select voxels 6-connected to the seed.
    pub local: bool,
}

impl Default for GrowParams {
    fn default() -> Self {
        Self {
            precision: 0.0,
            search_radius: None,
            local: false,
        }
    }
}

/// Outcome of a select-by-value call.
#[derive(Debug, Clone)]
pub struct GrowResult {
    /// Selection over the searched domain.
    pub selected: Array3<bool>,
    /// Low corner of `selected` within the image.
    pub offset: [usize; 3],
    /// Number of selected voxels.
    pub count: usize,
}

impl GrowResult {
    /// The searched domain.
    pub fn region(&self) -> Region {
        Region::new(self.offset, dims(&self.selected.view()))
    }

    /// The selection as a weight block of 0s and 1s.
    pub fn weights(&self) -> Array3<f32> {
        self.selected.mapv(|s| if s { 1.0 } else { 0.0 })
    }
}

/// Per-axis radius in voxels.
fn radii(radius: f64, pixdim: [f64; 3]) -> [f64; 3] {
    std::array::from_fn(|i| radius.max(0.0) / pixdim[i])
}

/// Bounding box of the ellipsoid around `seed`, cropped to `extent`.
fn ellipsoid_bounds(seed: [usize; 3], radii: [f64; 3], extent: [usize; 3]) -> Region {
    // No axis reaches further than the extent, so huge radii cannot overflow
    let reach: [usize; 3] = std::array::from_fn(|i| radii[i].min(extent[i] as f64).floor() as usize);
    let lo = std::array::from_fn(|i| seed[i].saturating_sub(reach[i]));
    let hi = std::array::from_fn(|i| seed[i].saturating_add(reach[i]).saturating_add(1).min(extent[i]));
    Region::from_bounds(lo, hi)
}

#[inline]
fn inside_ellipsoid(voxel: [usize; 3], seed: [usize; 3], radii: &[f64; 3]) -> bool {
    let mut dist = 0.0;
    for i in 0..3 {
        let d = voxel[i] as f64 - seed[i] as f64;
        if radii[i] > 0.0 {
            dist += (d / radii[i]).powi(2);
        } else if d != 0.0 {
            return false;
        }
    }
    dist <= 1.0
}

/// Grows a selection from `seed` over one image volume.
///
/// The searched domain is `restrict` (or the whole image) intersected with
/// the bounding box of the search ellipsoid. NaN voxels are never selected
/// and a NaN seed selects nothing. Fails with [`EditError::OutOfBounds`]
/// if the seed lies outside the image or outside `restrict`.
pub fn select_by_value(
    image: ArrayView3<f32>,
    pixdim: [f64; 3],
    seed: [usize; 3],
    params: &GrowParams,
    restrict: Option<Region>,
) -> Result<GrowResult> {
    let extent = dims(&image);
    Region::voxel(seed).check_within(extent)?;

    let mut domain = match restrict {
        Some(region) => {
            region.check_within(extent)?;
            region
        }
        None => Region::full(extent),
    };
    if !domain.contains(seed) {
        return Err(EditError::OutOfBounds {
            offset: seed,
            shape: [1; 3],
            extent: domain.end(),
        });
    }

    let radii = params.search_radius.map(|r| radii(r, pixdim));
    if let Some(radii) = radii {
        domain = domain
            .intersect(&ellipsoid_bounds(seed, radii, extent))
            .unwrap_or_else(|| Region::voxel(seed));
    }

    let mut selected = Array3::from_elem(domain.shape, false);
    let value = image[seed];
    if value.is_nan() {
        return Ok(GrowResult {
            selected,
            offset: domain.offset,
            count: 0,
        });
    }

    let precision = params.precision.max(0.0) as f64;
    let offset = domain.offset;
    let block = domain.slice(image);

    let candidate = |local: [usize; 3], v: f32| -> bool {
        if v.is_nan() || (v as f64 - value as f64).abs() > precision {
            return false;
        }
        match &radii {
            Some(radii) => {
                let voxel = std::array::from_fn(|i| local[i] + offset[i]);
                inside_ellipsoid(voxel, seed, radii)
            }
            None => true,
        }
    };

    let count = if params.local {
        grow_connected(&mut selected, block, Region::voxel(seed).relative_to(&domain), candidate)
    } else {
        Zip::indexed(&mut selected)
            .and(&block)
            .par_for_each(|(x, y, z), s, &v| *s = candidate([x, y, z], v));
        selected.iter().filter(|&&s| s).count()
    };

    debug!(
        "select_by_value seed={seed:?} precision={precision} local={} selected {count} of {} voxels",
        params.local,
        domain.len()
    );

    Ok(GrowResult {
        selected,
        offset,
        count,
    })
}

/// Breadth-first flood fill through 6-connected candidates.
fn grow_connected<F>(
    selected: &mut Array3<bool>,
    block: ArrayView3<f32>,
    start: [usize; 3],
    candidate: F,
) -> usize
where
    F: Fn([usize; 3], f32) -> bool,
{
    let shape = dims(&block);
    let mut visited = Array3::from_elem(selected.raw_dim(), false);
    let mut queue = VecDeque::new();
    let mut count = 0;

    queue.push_back(start);
    visited[start] = true;

    while let Some(voxel) = queue.pop_front() {
        if !candidate(voxel, block[voxel]) {
            continue;
        }
        selected[voxel] = true;
        count += 1;

        for axis in 0..3 {
            for forward in [false, true] {
                let mut next = voxel;
                if forward {
                    if voxel[axis] + 1 >= shape[axis] {
                        continue;
                    }
                    next[axis] += 1;
                } else {
                    if voxel[axis] == 0 {
                        continue;
                    }
                    next[axis] -= 1;
                }
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISO: [f64; 3] = [1.0, 1.0, 1.0];

    fn local(precision: f32) -> GrowParams {
        GrowParams {
            precision,
            search_radius: None,
            local: true,
        }
    }

    fn global(precision: f32) -> GrowParams {
        GrowParams {
            precision,
            ..GrowParams::default()
        }
    }

    /// Seed of 5.0 with a single 5.2 neighbour, everything else far away.
    fn seed_and_neighbour() -> Array3<f32> {
        let mut data = Array3::from_elem((20, 20, 20), 100.0);
        data[[10, 10, 10]] = 5.0;
        data[[10, 10, 11]] = 5.2;
        data
    }

    #[test]
    fn test_neighbour_outside_tolerance() {
        let data = seed_and_neighbour();
        let result = select_by_value(data.view(), ISO, [10, 10, 10], &local(0.1), None).unwrap();
        assert_eq!(result.count, 1);
        assert!(result.selected[[10, 10, 10]]);
        assert!(!result.selected[[10, 10, 11]]);
    }

    #[test]
    fn test_neighbour_inside_tolerance() {
        let data = seed_and_neighbour();
        let result = select_by_value(data.view(), ISO, [10, 10, 10], &local(0.3), None).unwrap();
        assert_eq!(result.count, 2);
        assert!(result.selected[[10, 10, 11]]);
    }

    #[test]
    fn test_uniform_volume_with_outlier() {
        let mut data = Array3::from_elem((20, 20, 20), 5.0);
        data[[10, 10, 11]] = 5.2;

        let tight = select_by_value(data.view(), ISO, [10, 10, 10], &local(0.1), None).unwrap();
        assert_eq!(tight.count, 20 * 20 * 20 - 1);
        assert!(!tight.selected[[10, 10, 11]]);

        let loose = select_by_value(data.view(), ISO, [10, 10, 10], &local(0.3), None).unwrap();
        assert_eq!(loose.count, 20 * 20 * 20);
    }

    #[test]
    fn test_local_respects_connectivity() {
        // Two slabs of 1.0 separated by a wall of 0.0 along x
        let mut data = Array3::from_elem((5, 3, 3), 1.0);
        for y in 0..3 {
            for z in 0..3 {
                data[[2, y, z]] = 0.0;
            }
        }

        let connected = select_by_value(data.view(), ISO, [0, 1, 1], &local(0.0), None).unwrap();
        assert_eq!(connected.count, 18);
        assert!(!connected.selected[[4, 1, 1]]);

        let everywhere = select_by_value(data.view(), ISO, [0, 1, 1], &global(0.0), None).unwrap();
        assert_eq!(everywhere.count, 36);
    }

    #[test]
    fn test_precision_is_monotonic() {
        let data = Array3::from_shape_fn((8, 8, 8), |(x, y, z)| ((x * 7 + y * 3 + z) % 11) as f32 * 0.5);
        let seed = [4, 4, 4];

        for is_local in [false, true] {
            let mut previous: Option<Array3<bool>> = None;
            for p in [0.0, 0.5, 1.0, 2.0, 3.0, 6.0] {
                let params = GrowParams {
                    precision: p,
                    search_radius: None,
                    local: is_local,
                };
                let result = select_by_value(data.view(), ISO, seed, &params, None).unwrap();
                if let Some(prev) = &previous {
                    assert!(prev
                        .iter()
                        .zip(result.selected.iter())
                        .all(|(&before, &after)| !before || after));
                }
                previous = Some(result.selected);
            }
        }
    }

    #[test]
    fn test_negative_precision_is_zero() {
        let data = seed_and_neighbour();
        let result = select_by_value(data.view(), ISO, [10, 10, 10], &global(-1.0), None).unwrap();
        assert_eq!(result.count, 1);
    }

    #[test]
    fn test_radius_is_ellipsoid_for_anisotropic_voxels() {
        let data = Array3::<f32>::zeros((21, 21, 21));
        let params = GrowParams {
            precision: 0.0,
            search_radius: Some(4.0),
            local: false,
        };
        // 2mm voxels along x halve the reach on that axis
        let result = select_by_value(data.view(), [2.0, 1.0, 1.0], [10, 10, 10], &params, None).unwrap();

        assert_eq!(result.region(), Region::from_bounds([8, 6, 6], [13, 15, 15]));
        let at = |v: [usize; 3]| result.selected[Region::voxel(v).relative_to(&result.region())];
        assert!(at([12, 10, 10]));
        assert!(at([10, 14, 10]));
        assert!(!at([12, 12, 10]));
        assert!(!at([10, 13, 13]));
    }

    #[test]
    fn test_huge_radius_covers_whole_volume() {
        let data = Array3::<f32>::zeros((5, 5, 5));
        for radius in [1e30, f64::INFINITY] {
            let params = GrowParams {
                precision: 0.0,
                search_radius: Some(radius),
                local: false,
            };
            let result = select_by_value(data.view(), ISO, [4, 0, 2], &params, None).unwrap();
            assert_eq!(result.region(), Region::full([5, 5, 5]));
            assert_eq!(result.count, 125);
        }
    }

    #[test]
    fn test_restrict_limits_domain() {
        let data = Array3::<f32>::zeros((6, 6, 6));
        let slice = Region::slice_of([6, 6, 6], 2, 3);
        let result = select_by_value(data.view(), ISO, [1, 1, 3], &global(0.0), Some(slice)).unwrap();

        assert_eq!(result.offset, [0, 0, 3]);
        assert_eq!(result.count, 36);
    }

    #[test]
    fn test_nan_handling() {
        let mut data = Array3::<f32>::zeros((3, 3, 3));
        data[[1, 1, 1]] = f32::NAN;

        let from_nan = select_by_value(data.view(), ISO, [1, 1, 1], &global(10.0), None).unwrap();
        assert_eq!(from_nan.count, 0);

        let around_nan = select_by_value(data.view(), ISO, [0, 0, 0], &global(10.0), None).unwrap();
        assert_eq!(around_nan.count, 26);
    }

    #[test]
    fn test_seed_out_of_bounds() {
        let data = Array3::<f32>::zeros((3, 3, 3));
        assert!(matches!(
            select_by_value(data.view(), ISO, [3, 0, 0], &global(0.0), None),
            Err(EditError::OutOfBounds { .. })
        ));

        let slice = Region::slice_of([3, 3, 3], 2, 0);
        assert!(matches!(
            select_by_value(data.view(), ISO, [0, 0, 2], &global(0.0), Some(slice)),
            Err(EditError::OutOfBounds { .. })
        ));
    }
}
