//! Before/after snapshots of a rectangular block of voxels.

use ndarray::{Array3, ArrayView3};

use super::region::{dims, Region};

/// The values of one block before and after a write.
///
/// Writing `new` at `offset` reproduces the post-write state, writing `old`
/// at `offset` restores the pre-write state exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockChange {
    pub offset: [usize; 3],
    pub old: Array3<f32>,
    pub new: Array3<f32>,
}

impl BlockChange {
    pub fn new(offset: [usize; 3], old: Array3<f32>, new: Array3<f32>) -> Self {
        debug_assert_eq!(old.shape(), new.shape());
        Self { offset, old, new }
    }

    pub fn shape(&self) -> [usize; 3] {
        dims(&self.old.view())
    }

    pub fn region(&self) -> Region {
        Region::new(self.offset, self.shape())
    }

    /// Bytes held by both snapshots.
    pub fn memory_size(&self) -> usize {
        (self.old.len() + self.new.len()) * std::mem::size_of::<f32>()
    }

    /// Folds `latest` into `self`, producing one change spanning both.
    ///
    /// `current` is the full volume after `latest` was written. The merged
    /// change keeps the values from before `self` and the values after
    /// `latest` over the bounding union of the two regions.
    pub fn merged_with(self, latest: BlockChange, current: ArrayView3<f32>) -> BlockChange {
        let union = self.region().union(&latest.region());

        let mut old = union.slice(current).to_owned();
        paste(&mut old, latest.old.view(), latest.region().relative_to(&union));
        paste(&mut old, self.old.view(), self.region().relative_to(&union));

        let new = union.slice(current).to_owned();
        BlockChange::new(union.offset, old, new)
    }
}

/// Copies `src` into `dest` with its low corner at `at`.
pub(crate) fn paste(dest: &mut Array3<f32>, src: ArrayView3<f32>, at: [usize; 3]) {
    Region::new(at, dims(&src))
        .slice_mut(dest.view_mut())
        .assign(&src);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_change_spans_both_regions() {
        // Volume after two writes: first set [0,0,0] to 1, then [2,0,0] to 1
        let mut current = Array3::<f32>::zeros((3, 1, 1));
        current[[0, 0, 0]] = 1.0;
        current[[2, 0, 0]] = 1.0;

        let first = BlockChange::new(
            [0, 0, 0],
            Array3::zeros((1, 1, 1)),
            Array3::ones((1, 1, 1)),
        );
        let second = BlockChange::new(
            [2, 0, 0],
            Array3::zeros((1, 1, 1)),
            Array3::ones((1, 1, 1)),
        );

        let merged = first.merged_with(second, current.view());
        assert_eq!(merged.region(), Region::new([0, 0, 0], [3, 1, 1]));
        assert_eq!(merged.old.as_slice().unwrap(), &[0.0, 0.0, 0.0]);
        assert_eq!(merged.new.as_slice().unwrap(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_merge_keeps_earliest_old_values() {
        // Same voxel written twice: 0.2 -> 0.5 -> 0.9
        let mut current = Array3::<f32>::zeros((1, 1, 1));
        current[[0, 0, 0]] = 0.9;

        let first = BlockChange::new(
            [0, 0, 0],
            Array3::from_elem((1, 1, 1), 0.2),
            Array3::from_elem((1, 1, 1), 0.5),
        );
        let second = BlockChange::new(
            [0, 0, 0],
            Array3::from_elem((1, 1, 1), 0.5),
            Array3::from_elem((1, 1, 1), 0.9),
        );

        let merged = first.merged_with(second, current.view());
        assert_eq!(merged.old[[0, 0, 0]], 0.2);
        assert_eq!(merged.new[[0, 0, 0]], 0.9);
    }
}
