//! The editor for one image: selection, history and image writes.

use log::{debug, trace, warn};
use ndarray::{ArrayView3, Zip};

use super::clipboard::Clipboard;
use super::history::{ChangeGroup, ChangeHistory, ChangeRecord, ChangeTarget};
use crate::error::{EditError, Result};
use crate::selection::notify::NoticeBatch;
use crate::selection::{GrowParams, GrowResult, SelectionMask, SkipAll, Suspend};
use crate::volume::{dims, BlockChange, ImageHandle, ImageId, Region};

/// A change to the selection or the image, for incremental consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub target: ChangeTarget,
    pub region: Region,
}

/// Receives change notices from an [`Editor`].
pub type EditListener = Box<dyn FnMut(&ChangeNotice)>;

/// Weighted blend of `old` towards `value`. A weight of 1 or more gives
/// `value` exactly, a weight of 0 or less leaves `old`.
#[inline]
fn blend(old: f32, value: f32, weight: f32) -> f32 {
    if weight >= 1.0 {
        value
    } else if weight > 0.0 {
        old * (1.0 - weight) + value * weight
    } else {
        old
    }
}

/// Owns the selection and undo history of one image.
///
/// Every selection and image mutation goes through the editor so that it is
/// recorded in the history. Mutations made while no change group is open
/// are undone individually.
pub struct Editor {
    image: ImageHandle,
    image_id: ImageId,
    volume: usize,
    selection: SelectionMask,
    history: ChangeHistory,
    listeners: Vec<(String, EditListener)>,
    batch: NoticeBatch<ChangeTarget>,
}

impl Editor {
    pub fn new(image: ImageHandle) -> Self {
        let (image_id, shape) = {
            let img = image.read();
            (img.id(), img.shape())
        };
        debug!("editor created for {image_id} with shape {shape:?}");

        Self {
            image,
            image_id,
            volume: 0,
            selection: SelectionMask::new(shape),
            history: ChangeHistory::default(),
            listeners: Vec::new(),
            batch: NoticeBatch::default(),
        }
    }

    /// Sets how many change groups can be undone.
    pub fn with_max_undo(mut self, max_undo: usize) -> Self {
        self.history.set_max_undo(max_undo);
        self
    }

    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    /// Volume of a 4D image that edits apply to.
    pub fn volume(&self) -> usize {
        self.volume
    }

    pub fn set_volume(&mut self, volume: usize) -> Result<()> {
        let n_volumes = self.image.read().n_volumes();
        if volume >= n_volumes {
            return Err(EditError::InvalidArgument(format!(
                "volume {volume} out of range for {} with {n_volumes} volumes",
                self.image_id
            )));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn selection(&self) -> &SelectionMask {
        &self.selection
    }

    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    // Listeners

    /// Registers a listener for selection and image change notices,
    /// replacing any listener of the same name.
    pub fn register_listener<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: FnMut(&ChangeNotice) + 'static,
    {
        let name = name.into();
        self.listeners.retain(|(n, _)| *n != name);
        self.listeners.push((name, Box::new(listener)));
    }

    pub fn deregister_listener(&mut self, name: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(n, _)| n != name);
        self.listeners.len() != before
    }

    /// Registers a listener on the selection mask itself, which also
    /// receives the new weights of the changed region.
    pub fn register_selection_listener<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: FnMut(&Region, ArrayView3<'_, f32>) + 'static,
    {
        self.selection.register(name, listener);
    }

    pub fn deregister_selection_listener(&mut self, name: &str) -> bool {
        self.selection.deregister(name)
    }

    /// Holds back notifications from the editor and its selection until
    /// the guard drops.
    pub fn skip_all(&mut self) -> SkipAll<'_, Self> {
        SkipAll::new(self)
    }

    fn notify(&mut self, target: ChangeTarget, region: Region) {
        if let Some((target, region)) = self.batch.defer(target, region) {
            self.deliver(ChangeNotice { target, region });
        }
    }

    fn deliver(&mut self, notice: ChangeNotice) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&notice);
        }
    }

    // Change groups

    pub fn start_change_group(&mut self) -> Result<()> {
        self.history.start_group()
    }

    /// Closes the open change group. Returns `false` if nothing was
    /// recorded in it.
    pub fn end_change_group(&mut self) -> Result<bool> {
        self.history.end_group()
    }

    pub fn in_change_group(&self) -> bool {
        self.history.in_group()
    }

    fn record(&mut self, target: ChangeTarget, change: Option<BlockChange>) {
        if let Some(change) = change {
            trace!("{target:?} change at {:?} shape {:?}", change.offset, change.shape());
            self.notify(target, change.region());
            self.history.record(ChangeRecord { target, change });
        }
    }

    // Selection

    /// The most recent selection change, see [`SelectionMask::last_change`].
    pub fn last_selection_change(&self) -> Option<&BlockChange> {
        self.selection.last_change()
    }

    pub fn reset_selection_change(&mut self) {
        self.selection.reset_change();
    }

    pub fn add_to_selection(&mut self, block: ArrayView3<f32>, offset: [usize; 3], combine: bool) -> Result<()> {
        let change = self.selection.add_to_selection(block, offset, combine)?;
        self.record(ChangeTarget::Selection, change);
        Ok(())
    }

    pub fn remove_from_selection(&mut self, block: ArrayView3<f32>, offset: [usize; 3], combine: bool) -> Result<()> {
        let change = self.selection.remove_from_selection(block, offset, combine)?;
        self.record(ChangeTarget::Selection, change);
        Ok(())
    }

    pub fn set_selection(&mut self, block: ArrayView3<f32>, offset: [usize; 3]) -> Result<()> {
        let change = self.selection.set_selection(block, offset)?;
        self.record(ChangeTarget::Selection, change);
        Ok(())
    }

    pub fn clear_selection(&mut self) -> Result<()> {
        let change = self.selection.clear(None)?;
        self.record(ChangeTarget::Selection, change);
        Ok(())
    }

    pub fn clear_selection_within(&mut self, region: Region) -> Result<()> {
        let change = self.selection.clear(Some(region))?;
        self.record(ChangeTarget::Selection, change);
        Ok(())
    }

    /// Grows a selection from `seed` over the edited volume.
    pub fn select_by_value(
        &mut self,
        seed: [usize; 3],
        params: &GrowParams,
        restrict: Option<Region>,
        combine: bool,
    ) -> Result<GrowResult> {
        let (grown, change) = {
            let image = self.image.read();
            let data = image.volume(self.volume)?;
            self.selection
                .select_by_value(seed, data, image.pixdim(), params, restrict, combine)?
        };
        self.record(ChangeTarget::Selection, change);
        Ok(grown)
    }

    // Image

    /// Writes `value` into every selected voxel, blended by its selection
    /// weight: `old * (1 - w) + value * w`. Does nothing when the selection
    /// is empty.
    pub fn fill_selection(&mut self, value: f32) -> Result<()> {
        let Some(bounds) = self.selection.bounds() else {
            debug!("fill of {} skipped, selection is empty", self.image_id);
            return Ok(());
        };

        let change = {
            let mut image = self.image.write();
            let old = image.read_block(bounds, self.volume)?;
            let weights = bounds.slice(self.selection.get());
            let filled = Zip::from(&old)
                .and(&weights)
                .map_collect(|&o, &w| blend(o, value, w));
            image.write_block(filled.view(), bounds.offset, self.volume)?;
            let new = image.read_block(bounds, self.volume)?;
            BlockChange::new(bounds.offset, old, new)
        };

        debug!("filled {:?} of {} with {value}", bounds, self.image_id);
        self.record(ChangeTarget::Image { volume: self.volume }, Some(change));
        Ok(())
    }

    /// Copies the selected values of the edited volume.
    pub fn copy_selection(&self) -> Result<Clipboard> {
        let image = self.image.read();
        Clipboard::capture(&self.image, &image, self.volume, &self.selection)
    }

    /// Pastes `clipboard` where both its weights and the current selection
    /// are non-zero, blended by the current selection weight.
    ///
    /// Fails with [`EditError::IncompatibleGeometry`] if the clipboard's
    /// source is gone or differs in shape or spacing. An empty clipboard
    /// changes nothing.
    pub fn paste_selection(&mut self, clipboard: &Clipboard) -> Result<()> {
        if clipboard.is_empty() {
            debug!("paste into {} skipped, clipboard is empty", self.image_id);
            return Ok(());
        }

        let change = {
            let mut image = self.image.write();
            if let Err(err) = clipboard.check_compatible(&image) {
                warn!("paste into {} rejected: {err}", self.image_id);
                return Err(err);
            }

            let region = clipboard.region();
            let old = image.read_block(region, self.volume)?;
            let current = region.slice(self.selection.get());
            let mut touched = false;
            let mut pasted = old.clone();
            Zip::from(&mut pasted)
                .and(clipboard.data())
                .and(clipboard.weights())
                .and(&current)
                .for_each(|v, &data, &copied, &selected| {
                    if copied > 0.0 && selected > 0.0 {
                        *v = blend(*v, data, selected);
                        touched = true;
                    }
                });
            if !touched {
                debug!("paste into {} skipped, no overlap with the selection", self.image_id);
                return Ok(());
            }

            image.write_block(pasted.view(), region.offset, self.volume)?;
            let new = image.read_block(region, self.volume)?;
            BlockChange::new(region.offset, old, new)
        };

        self.record(ChangeTarget::Image { volume: self.volume }, Some(change));
        Ok(())
    }

    // Undo / redo

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn mark_saved(&mut self) {
        self.history.mark_saved();
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.history.has_unsaved_changes()
    }

    /// Reverts the most recent change group. Returns `false` if there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let Some(group) = self.history.take_undo()? else {
            return Ok(false);
        };
        debug!("undo of {} records on {}", group.len(), self.image_id);
        self.replay(&group, true)?;
        self.history.finish_undo(group);
        Ok(true)
    }

    /// Re-applies the most recently undone change group. Returns `false`
    /// if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        let Some(group) = self.history.take_redo()? else {
            return Ok(false);
        };
        debug!("redo of {} records on {}", group.len(), self.image_id);
        self.replay(&group, false)?;
        self.history.finish_redo(group);
        Ok(true)
    }

    /// Writes the old values in reverse order, or the new values in order.
    /// The last selection change afterwards spans every selection record of
    /// the group.
    fn replay(&mut self, group: &ChangeGroup, backwards: bool) -> Result<()> {
        let mut editor = self.skip_all();
        let records: Vec<&ChangeRecord> = if backwards {
            group.records().iter().rev().collect()
        } else {
            group.records().iter().collect()
        };
        if group.region(ChangeTarget::Selection).is_some() {
            editor.selection.reset_change();
        }

        for record in records {
            let change = &record.change;
            let block = if backwards { change.old.view() } else { change.new.view() };
            editor.apply(record.target, block, change.offset)?;
        }
        Ok(())
    }

    fn apply(&mut self, target: ChangeTarget, block: ArrayView3<f32>, offset: [usize; 3]) -> Result<()> {
        match target {
            ChangeTarget::Selection => {
                self.selection.restore(block, offset)?;
            }
            ChangeTarget::Image { volume } => {
                self.image.write().write_block(block, offset, volume)?;
            }
        }
        self.notify(target, Region::new(offset, dims(&block)));
        Ok(())
    }
}

impl Suspend for Editor {
    fn suspend(&mut self) {
        self.batch.suspend();
        self.selection.suspend();
    }

    fn resume(&mut self) {
        self.selection.resume();
        for (target, region) in self.batch.resume() {
            self.deliver(ChangeNotice { target, region });
        }
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("image", &self.image_id)
            .field("volume", &self.volume)
            .field("selection", &self.selection)
            .field("history", &self.history)
            .finish()
    }
}
