//! Axis-aligned voxel regions.

use ndarray::{s, ArrayView3, ArrayViewMut3};

use crate::error::{EditError, Result};

/// An axis-aligned box of voxels, given by its low corner and its extent.
///
/// A region with a zero extent along any axis is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
    pub offset: [usize; 3],
    pub shape: [usize; 3],
}

impl Region {
    pub fn new(offset: [usize; 3], shape: [usize; 3]) -> Self {
        Self { offset, shape }
    }

    /// The region covering a whole volume of the given extent.
    pub fn full(extent: [usize; 3]) -> Self {
        Self::new([0; 3], extent)
    }

    /// Region spanning `lo` (inclusive) to `hi` (exclusive).
    pub fn from_bounds(lo: [usize; 3], hi: [usize; 3]) -> Self {
        Self::new(lo, std::array::from_fn(|i| hi[i].saturating_sub(lo[i])))
    }

    /// Single voxel region.
    pub fn voxel(voxel: [usize; 3]) -> Self {
        Self::new(voxel, [1; 3])
    }

    /// One slice of a volume, perpendicular to `axis`, at `index`.
    pub fn slice_of(extent: [usize; 3], axis: usize, index: usize) -> Self {
        let mut region = Self::full(extent);
        region.offset[axis] = index;
        region.shape[axis] = 1;
        region
    }

    /// Exclusive upper corner.
    pub fn end(&self) -> [usize; 3] {
        std::array::from_fn(|i| self.offset[i] + self.shape[i])
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&s| s == 0)
    }

    /// Number of voxels in the region.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn contains(&self, voxel: [usize; 3]) -> bool {
        (0..3).all(|i| voxel[i] >= self.offset[i] && voxel[i] < self.offset[i] + self.shape[i])
    }

    /// Overlap of two regions, or `None` if they do not overlap.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let (a, b) = (self.end(), other.end());
        let lo: [usize; 3] = std::array::from_fn(|i| self.offset[i].max(other.offset[i]));
        let hi: [usize; 3] = std::array::from_fn(|i| a[i].min(b[i]));
        let region = Region::from_bounds(lo, hi);
        (!region.is_empty()).then_some(region)
    }

    /// Smallest region containing both regions. Empty regions are ignored.
    pub fn union(&self, other: &Region) -> Region {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let (a, b) = (self.end(), other.end());
        Region::from_bounds(
            std::array::from_fn(|i| self.offset[i].min(other.offset[i])),
            std::array::from_fn(|i| a[i].max(b[i])),
        )
    }

    /// Shift the region by `by` voxels.
    pub fn translate(&self, by: [usize; 3]) -> Region {
        Region::new(std::array::from_fn(|i| self.offset[i] + by[i]), self.shape)
    }

    /// Offset of this region relative to the low corner of `outer`.
    pub(crate) fn relative_to(&self, outer: &Region) -> [usize; 3] {
        std::array::from_fn(|i| self.offset[i] - outer.offset[i])
    }

    /// Fails with [`EditError::OutOfBounds`] unless the region fits inside
    /// a volume of the given extent.
    pub fn check_within(&self, extent: [usize; 3]) -> Result<()> {
        let fits = (0..3).all(|i| {
            self.offset[i]
                .checked_add(self.shape[i])
                .is_some_and(|end| end <= extent[i])
        });
        if fits {
            Ok(())
        } else {
            Err(EditError::OutOfBounds {
                offset: self.offset,
                shape: self.shape,
                extent,
            })
        }
    }

    /// View of this region within `view`. The region must fit.
    pub fn slice<'a, T>(&self, view: ArrayView3<'a, T>) -> ArrayView3<'a, T> {
        let [x, y, z] = self.offset;
        let [ex, ey, ez] = self.end();
        view.slice_move(s![x..ex, y..ey, z..ez])
    }

    /// Mutable view of this region within `view`. The region must fit.
    pub fn slice_mut<'a, T>(&self, view: ArrayViewMut3<'a, T>) -> ArrayViewMut3<'a, T> {
        let [x, y, z] = self.offset;
        let [ex, ey, ez] = self.end();
        view.slice_move(s![x..ex, y..ey, z..ez])
    }

    /// Tight bounding box of the positive entries of `weights`, relative to
    /// the view's origin.
    pub fn nonzero_bounds(weights: ArrayView3<f32>) -> Option<Region> {
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut found = false;

        for ((x, y, z), &w) in weights.indexed_iter() {
            if w > 0.0 {
                found = true;
                for (axis, v) in [x, y, z].into_iter().enumerate() {
                    lo[axis] = lo[axis].min(v);
                    hi[axis] = hi[axis].max(v + 1);
                }
            }
        }

        found.then(|| Region::from_bounds(lo, hi))
    }
}

/// Extent of a 3D array view as an `[x, y, z]` triple.
pub fn dims<T>(view: &ArrayView3<T>) -> [usize; 3] {
    let (x, y, z) = view.dim();
    [x, y, z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_intersect_and_union() {
        let a = Region::new([0, 0, 0], [4, 4, 4]);
        let b = Region::new([2, 3, 1], [4, 4, 4]);

        assert_eq!(a.intersect(&b), Some(Region::new([2, 3, 1], [2, 1, 3])));
        assert_eq!(a.union(&b), Region::new([0, 0, 0], [6, 7, 5]));

        let far = Region::new([10, 10, 10], [1, 1, 1]);
        assert_eq!(a.intersect(&far), None);
        assert_eq!(Region::default().union(&far), far);
    }

    #[test]
    fn test_check_within() {
        let extent = [5, 5, 5];
        assert!(Region::new([1, 1, 1], [4, 4, 4]).check_within(extent).is_ok());
        assert!(matches!(
            Region::new([2, 0, 0], [4, 1, 1]).check_within(extent),
            Err(EditError::OutOfBounds { .. })
        ));
        assert!(Region::new([usize::MAX, 0, 0], [2, 1, 1])
            .check_within(extent)
            .is_err());
    }

    #[test]
    fn test_slice_of_axis() {
        let region = Region::slice_of([8, 6, 4], 2, 3);
        assert_eq!(region, Region::new([0, 0, 3], [8, 6, 1]));
        assert!(region.contains([7, 5, 3]));
        assert!(!region.contains([7, 5, 2]));
    }

    #[test]
    fn test_nonzero_bounds() {
        let mut weights = Array3::<f32>::zeros((6, 6, 6));
        assert_eq!(Region::nonzero_bounds(weights.view()), None);

        weights[[1, 2, 3]] = 1.0;
        weights[[4, 2, 1]] = 0.25;
        assert_eq!(
            Region::nonzero_bounds(weights.view()),
            Some(Region::new([1, 2, 1], [4, 1, 3]))
        );
    }

    #[test]
    fn test_slice_views() {
        let mut data = Array3::<f32>::zeros((4, 4, 4));
        let region = Region::new([1, 1, 1], [2, 2, 2]);
        region.slice_mut(data.view_mut()).fill(3.0);

        assert_eq!(region.slice(data.view()).sum(), 24.0);
        assert_eq!(data.sum(), 24.0);
    }
}
