//! Per-voxel selection weights for one image.
//!
//! A [`SelectionMask`] holds a weight in `[0, 1]` for every voxel of the
//! image it belongs to. Every mutation returns the [`BlockChange`] it made
//! so the owner can record it for undo, tracks the most recent change for
//! incremental consumers, and notifies registered listeners with the
//! changed region.

use log::trace;
use ndarray::{Array3, ArrayView3, Zip};

use super::notify::{NoticeBatch, SkipAll, Suspend};
use super::region_grow::{self, GrowParams, GrowResult};
use crate::error::{EditError, Result};
use crate::volume::{dims, BlockChange, Region};

/// Receives the changed region and the new weights inside it.
pub type MaskListener = Box<dyn FnMut(&Region, ArrayView3<'_, f32>)>;

#[derive(Clone, Copy)]
enum WriteMode {
    Add,
    Remove,
}

impl WriteMode {
    #[inline]
    fn apply(self, old: f32, value: f32, combine: bool) -> f32 {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        match (self, combine) {
            (WriteMode::Add, true) => old.max(value),
            (WriteMode::Add, false) => value,
            (WriteMode::Remove, true) => old.min(1.0 - value),
            (WriteMode::Remove, false) => 1.0 - value,
        }
    }
}

/// Selection weights plus change tracking.
pub struct SelectionMask {
    weights: Array3<f32>,
    last_change: Option<BlockChange>,
    listeners: Vec<(String, MaskListener)>,
    batch: NoticeBatch<()>,
}

impl SelectionMask {
    /// An empty selection over a volume of the given extent.
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            weights: Array3::zeros(shape),
            last_change: None,
            listeners: Vec::new(),
            batch: NoticeBatch::default(),
        }
    }

    /// The full selection volume.
    pub fn get(&self) -> ArrayView3<'_, f32> {
        self.weights.view()
    }

    pub fn shape(&self) -> [usize; 3] {
        dims(&self.weights.view())
    }

    /// Weight of one voxel, `None` outside the mask.
    pub fn weight(&self, voxel: [usize; 3]) -> Option<f32> {
        self.weights.get(voxel).copied()
    }

    /// Writes `block` at `offset`, taking the voxel-wise maximum with the
    /// current weights when `combine` is set.
    pub fn set_block(&mut self, block: ArrayView3<f32>, offset: [usize; 3], combine: bool) -> Result<Option<BlockChange>> {
        self.write(block, offset, combine, WriteMode::Add)
    }

    /// Additive write, same as [`set_block`](Self::set_block).
    pub fn add_to_selection(
        &mut self,
        block: ArrayView3<f32>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<Option<BlockChange>> {
        self.write(block, offset, combine, WriteMode::Add)
    }

    /// Subtractive write: weights become `1 - block`, or the minimum of that
    /// and the current weights when `combine` is set.
    pub fn remove_from_selection(
        &mut self,
        block: ArrayView3<f32>,
        offset: [usize; 3],
        combine: bool,
    ) -> Result<Option<BlockChange>> {
        self.write(block, offset, combine, WriteMode::Remove)
    }

    /// Replaces the weights under `block` outright.
    pub fn set_selection(&mut self, block: ArrayView3<f32>, offset: [usize; 3]) -> Result<Option<BlockChange>> {
        self.write(block, offset, false, WriteMode::Add)
    }

    /// Replaces the weights under `block`, folding the change into the
    /// tracked last change. Used to replay several snapshots as one edit.
    pub(crate) fn restore(&mut self, block: ArrayView3<f32>, offset: [usize; 3]) -> Result<Option<BlockChange>> {
        self.write_tracked(block, offset, false, WriteMode::Add, true)
    }

    fn write(
        &mut self,
        block: ArrayView3<f32>,
        offset: [usize; 3],
        combine: bool,
        mode: WriteMode,
    ) -> Result<Option<BlockChange>> {
        self.write_tracked(block, offset, combine, mode, combine)
    }

    fn write_tracked(
        &mut self,
        block: ArrayView3<f32>,
        offset: [usize; 3],
        combine: bool,
        mode: WriteMode,
        merge: bool,
    ) -> Result<Option<BlockChange>> {
        let region = Region::new(offset, dims(&block));
        region.check_within(self.shape())?;
        if region.is_empty() {
            return Ok(None);
        }

        let mut target = region.slice_mut(self.weights.view_mut());
        let old = target.to_owned();
        Zip::from(&mut target)
            .and(&block)
            .for_each(|w, &b| *w = mode.apply(*w, b, combine));
        let new = target.to_owned();

        let change = BlockChange::new(offset, old, new);
        self.track(change.clone(), merge);
        self.notify(region);
        Ok(Some(change))
    }

    /// Zeroes the whole mask, or only `restrict`.
    ///
    /// The change covers the tight box of previously selected voxels inside
    /// the cleared area. Clearing an empty area changes nothing and returns
    /// `None`.
    pub fn clear(&mut self, restrict: Option<Region>) -> Result<Option<BlockChange>> {
        let area = restrict.unwrap_or_else(|| Region::full(self.shape()));
        area.check_within(self.shape())?;

        let Some(bounds) = Region::nonzero_bounds(area.slice(self.weights.view())) else {
            return Ok(None);
        };
        let region = bounds.translate(area.offset);

        let mut target = region.slice_mut(self.weights.view_mut());
        let old = target.to_owned();
        target.fill(0.0);

        let change = BlockChange::new(region.offset, old, Array3::zeros(region.shape));
        self.track(change.clone(), false);
        self.notify(region);
        Ok(Some(change))
    }

    /// Grows a selection from `seed` over `image` and writes it with
    /// [`set_block`](Self::set_block) semantics.
    pub fn select_by_value(
        &mut self,
        seed: [usize; 3],
        image: ArrayView3<f32>,
        pixdim: [f64; 3],
        params: &GrowParams,
        restrict: Option<Region>,
        combine: bool,
    ) -> Result<(GrowResult, Option<BlockChange>)> {
        if dims(&image) != self.shape() {
            return Err(EditError::ShapeMismatch {
                expected: self.shape(),
                found: dims(&image),
            });
        }
        let grown = region_grow::select_by_value(image, pixdim, seed, params, restrict)?;
        let change = self.set_block(grown.weights().view(), grown.offset, combine)?;
        Ok((grown, change))
    }

    /// The most recent change, merged with earlier ones while writes were
    /// combining.
    pub fn last_change(&self) -> Option<&BlockChange> {
        self.last_change.as_ref()
    }

    /// Forget the most recent change.
    pub fn reset_change(&mut self) {
        self.last_change = None;
    }

    fn track(&mut self, change: BlockChange, combine: bool) {
        trace!("selection change at {:?} shape {:?}", change.offset, change.shape());
        self.last_change = match self.last_change.take() {
            Some(previous) if combine => Some(previous.merged_with(change, self.weights.view())),
            _ => Some(change),
        };
    }

    /// Tight box of the selected voxels.
    pub fn bounds(&self) -> Option<Region> {
        Region::nonzero_bounds(self.weights.view())
    }

    /// Number of voxels with a non-zero weight.
    pub fn selected_count(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0.0).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.weights.iter().any(|&w| w > 0.0)
    }

    /// Registers `listener` under `name`, replacing any listener of the
    /// same name.
    pub fn register<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: FnMut(&Region, ArrayView3<'_, f32>) + 'static,
    {
        let name = name.into();
        self.listeners.retain(|(n, _)| *n != name);
        self.listeners.push((name, Box::new(listener)));
    }

    /// Removes the listener registered under `name`.
    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(n, _)| n != name);
        self.listeners.len() != before
    }

    /// Holds back notifications until the guard drops, then delivers one
    /// notification covering every region changed in between.
    pub fn skip_all(&mut self) -> SkipAll<'_, Self> {
        SkipAll::new(self)
    }

    fn notify(&mut self, region: Region) {
        if let Some(((), region)) = self.batch.defer((), region) {
            self.deliver(region);
        }
    }

    fn deliver(&mut self, region: Region) {
        let Self { weights, listeners, .. } = self;
        let view = region.slice(weights.view());
        for (_, listener) in listeners.iter_mut() {
            listener(&region, view.view());
        }
    }
}

impl Suspend for SelectionMask {
    fn suspend(&mut self) {
        self.batch.suspend();
    }

    fn resume(&mut self) {
        for ((), region) in self.batch.resume() {
            self.deliver(region);
        }
    }
}

impl std::fmt::Debug for SelectionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionMask")
            .field("shape", &self.shape())
            .field("last_change", &self.last_change.as_ref().map(BlockChange::region))
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
