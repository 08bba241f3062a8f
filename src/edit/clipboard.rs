//! Copied selection contents.

use std::sync::Arc;

use ndarray::{Array3, Zip};

use crate::error::{EditError, Result};
use crate::selection::SelectionMask;
use crate::volume::{dims, same_geometry, Image, ImageHandle, Region, WeakImage};

/// Image values copied from inside a selection, with the selection weights
/// and the geometry of the image they came from.
///
/// A clipboard holds only a weak reference to its source, so it never keeps
/// an image alive. Once the source is dropped the clipboard can no longer
/// be pasted anywhere.
#[derive(Debug, Clone)]
pub struct Clipboard {
    data: Array3<f32>,
    weights: Array3<f32>,
    offset: [usize; 3],
    source_shape: [usize; 3],
    source_pixdim: [f64; 3],
    source: WeakImage,
}

impl Clipboard {
    /// Copies the selected values of one volume of `image`. An empty
    /// selection gives an empty clipboard.
    pub(crate) fn capture(
        handle: &ImageHandle,
        image: &Image,
        volume: usize,
        selection: &SelectionMask,
    ) -> Result<Self> {
        let source = Arc::downgrade(handle);
        let Some(bounds) = selection.bounds() else {
            return Ok(Self {
                data: Array3::zeros((0, 0, 0)),
                weights: Array3::zeros((0, 0, 0)),
                offset: [0; 3],
                source_shape: image.shape(),
                source_pixdim: image.pixdim(),
                source,
            });
        };

        let weights = bounds.slice(selection.get()).to_owned();
        let mut data = image.read_block(bounds, volume)?;
        Zip::from(&mut data)
            .and(&weights)
            .for_each(|v, &w| if w <= 0.0 { *v = 0.0 });

        Ok(Self {
            data,
            weights,
            offset: bounds.offset,
            source_shape: image.shape(),
            source_pixdim: image.pixdim(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Where the copied block sits in its source image.
    pub fn region(&self) -> Region {
        Region::new(self.offset, dims(&self.data.view()))
    }

    /// Copied values; zero outside the selection.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Selection weights at copy time.
    pub fn weights(&self) -> &Array3<f32> {
        &self.weights
    }

    /// Whether the source image still exists.
    pub fn source_alive(&self) -> bool {
        self.source.strong_count() > 0
    }

    /// Whether this clipboard can be pasted into `image`: the source must
    /// still exist and share the image's shape and voxel spacing.
    pub fn is_compatible(&self, image: &Image) -> bool {
        self.source_alive()
            && same_geometry(self.source_shape, self.source_pixdim, image.shape(), image.pixdim())
    }

    /// Like [`is_compatible`](Self::is_compatible), but fails with
    /// [`EditError::IncompatibleGeometry`] naming the reason.
    pub fn check_compatible(&self, image: &Image) -> Result<()> {
        if self.is_compatible(image) {
            return Ok(());
        }
        let reason = if self.source_alive() {
            format!("clipboard geometry does not match {}", image.name())
        } else {
            "clipboard source image no longer exists".to_string()
        };
        Err(EditError::IncompatibleGeometry(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(shape: (usize, usize, usize), pixdim: [f64; 3]) -> ImageHandle {
        let data = Array3::from_shape_fn(shape, |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        Image::new("source", data, pixdim).unwrap().into_handle()
    }

    #[test]
    fn test_empty_selection_gives_empty_clipboard() {
        let image = handle((4, 4, 4), [1.0; 3]);
        let selection = SelectionMask::new([4, 4, 4]);
        let clipboard = Clipboard::capture(&image, &image.read(), 0, &selection).unwrap();
        assert!(clipboard.is_empty());
        assert!(clipboard.region().is_empty());
    }

    #[test]
    fn test_capture_masks_by_weight() {
        let image = handle((4, 4, 4), [1.0; 3]);
        let mut selection = SelectionMask::new([4, 4, 4]);
        selection.set_selection(Array3::ones((1, 1, 1)).view(), [1, 1, 0]).unwrap();
        selection.set_selection(Array3::from_elem((1, 1, 1), 0.5).view(), [2, 2, 0]).unwrap();

        let clipboard = Clipboard::capture(&image, &image.read(), 0, &selection).unwrap();
        assert_eq!(clipboard.region(), Region::new([1, 1, 0], [2, 2, 1]));
        assert_eq!(clipboard.data()[[0, 0, 0]], 11.0);
        assert_eq!(clipboard.data()[[1, 1, 0]], 22.0);
        // Unselected corners are zeroed
        assert_eq!(clipboard.data()[[1, 0, 0]], 0.0);
        assert_eq!(clipboard.weights()[[1, 1, 0]], 0.5);
    }

    #[test]
    fn test_compatibility() {
        let image = handle((4, 4, 4), [1.0; 3]);
        let mut selection = SelectionMask::new([4, 4, 4]);
        selection.set_selection(Array3::ones((1, 1, 1)).view(), [0, 0, 0]).unwrap();
        let clipboard = Clipboard::capture(&image, &image.read(), 0, &selection).unwrap();

        let same = handle((4, 4, 4), [1.0; 3]);
        let other_shape = handle((4, 4, 5), [1.0; 3]);
        let other_spacing = handle((4, 4, 4), [1.0, 1.0, 1.5]);
        assert!(clipboard.is_compatible(&same.read()));
        assert!(!clipboard.is_compatible(&other_shape.read()));
        assert!(!clipboard.is_compatible(&other_spacing.read()));
    }

    #[test]
    fn test_dropped_source_is_incompatible() {
        let image = handle((4, 4, 4), [1.0; 3]);
        let mut selection = SelectionMask::new([4, 4, 4]);
        selection.set_selection(Array3::ones((1, 1, 1)).view(), [0, 0, 0]).unwrap();
        let clipboard = Clipboard::capture(&image, &image.read(), 0, &selection).unwrap();

        let other = handle((4, 4, 4), [1.0; 3]);
        drop(image);
        assert!(!clipboard.source_alive());
        assert!(!clipboard.is_compatible(&other.read()));
        assert!(matches!(
            clipboard.check_compatible(&other.read()),
            Err(EditError::IncompatibleGeometry(reason)) if reason.contains("no longer exists")
        ));
    }
}
