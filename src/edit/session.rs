//! Interactive editing over a set of images.
//!
//! An [`EditSession`] tracks the current image, an optional target image
//! that fills and pastes are routed to, the clipboard and the settings
//! driving brush strokes and select-by-value. Interaction code maps screen
//! positions to voxels and calls into the session.

use std::collections::HashMap;

use log::{debug, warn};

use super::clipboard::Clipboard;
use super::editor::Editor;
use super::registry::EditorRegistry;
use crate::config::{EditSettings, SEARCH_RADIUS_RANGE, SELECTION_SIZE_RANGE};
use crate::error::{EditError, Result};
use crate::selection::{GrowParams, GrowResult, MergeAdvisor, MergeDecision, SelectionOp};
use crate::volume::{voxel_block, Bias, Image, ImageHandle, ImageId, Region};

/// Search radius change per adjustment step, in world units.
const RADIUS_STEP: f64 = 2.5;

/// Number of threshold steps spanning the data range.
const THRESHOLD_STEPS: f32 = 100.0;

/// Settings remembered per image while other images are current.
#[derive(Debug, Clone, Copy, Default)]
struct ImageState {
    threshold: f32,
    limit: f32,
    target: Option<ImageId>,
}

/// Editing state shared by every image being edited.
#[derive(Debug)]
pub struct EditSession {
    settings: EditSettings,
    registry: EditorRegistry,
    current: Option<ImageId>,
    target: Option<ImageId>,
    clipboard: Option<Clipboard>,
    advisor: MergeAdvisor,
    image_state: HashMap<ImageId, ImageState>,
}

/// Runs `f` inside a change group on `editor`. The group is closed even if
/// `f` fails, so changes made before the failure stay undoable.
fn grouped<T>(editor: &mut Editor, f: impl FnOnce(&mut Editor) -> Result<T>) -> Result<T> {
    editor.start_change_group()?;
    let result = f(editor);
    editor.end_change_group()?;
    result
}

impl EditSession {
    pub fn new(settings: EditSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            registry: EditorRegistry::new(settings.max_undo_groups),
            settings,
            current: None,
            target: None,
            clipboard: None,
            advisor: MergeAdvisor::new(),
            image_state: HashMap::new(),
        })
    }

    pub fn settings(&self) -> &EditSettings {
        &self.settings
    }

    pub fn registry(&self) -> &EditorRegistry {
        &self.registry
    }

    pub fn current_image(&self) -> Option<ImageId> {
        self.current
    }

    pub fn target_image(&self) -> Option<ImageId> {
        self.target
    }

    pub fn clipboard(&self) -> Option<&Clipboard> {
        self.clipboard.as_ref()
    }

    pub fn current_editor(&self) -> Option<&Editor> {
        self.current.and_then(|id| self.registry.get(id))
    }

    pub fn current_editor_mut(&mut self) -> Option<&mut Editor> {
        let id = self.current?;
        self.registry.get_mut(id)
    }

    fn editor_mut(&mut self) -> Result<&mut Editor> {
        let id = self
            .current
            .ok_or_else(|| EditError::InvalidArgument("no image is selected".into()))?;
        self.registry
            .get_mut(id)
            .ok_or_else(|| EditError::InvalidArgument(format!("{id} has no editor")))
    }

    // Images

    /// Makes the attached editable set match `images`. Forgets the current
    /// or target image if it left the set. Returns the detached identities.
    pub fn sync_images(&mut self, images: &[ImageHandle]) -> Vec<ImageId> {
        let removed = self.registry.sync(images);
        for id in &removed {
            self.image_state.remove(id);
            if self.current == Some(*id) {
                self.current = None;
                self.target = None;
            }
            if self.target == Some(*id) {
                self.target = None;
            }
        }
        removed
    }

    /// Makes `image` the current image.
    ///
    /// The selection of the previous image moves to the new one when both
    /// share the same space, otherwise it is cleared. The intensity
    /// threshold limit is half the new image's data range.
    pub fn select_image(&mut self, image: &ImageHandle) -> Result<()> {
        let id = image.read().id();
        if self.current == Some(id) {
            return Ok(());
        }

        if let Some(old) = self.current {
            let state = self.image_state.entry(old).or_default();
            state.threshold = self.settings.intensity_threshold;
            state.target = self.target;
        }

        self.registry.attach(image);
        if let Some(old) = self.current {
            self.move_selection(old, id)?;
        }

        let (lo, hi) = image.read().data_range().unwrap_or((0.0, 0.0));
        let cached = self.image_state.get(&id).copied().unwrap_or_default();
        let limit = if cached.limit > 0.0 {
            cached.limit
        } else {
            (hi - lo) / 2.0
        };
        let threshold = cached.threshold.min(limit).max(0.0);

        self.image_state.insert(
            id,
            ImageState {
                threshold,
                limit,
                target: cached.target,
            },
        );
        self.settings.intensity_threshold = threshold;
        self.current = Some(id);
        self.target = cached.target.filter(|t| self.registry.contains(*t) && !self.settings.draw_mode);
        self.advisor.reset();

        debug!("selected {id}, threshold {threshold} (limit {limit})");
        Ok(())
    }

    fn move_selection(&mut self, from: ImageId, to: ImageId) -> Result<()> {
        let (same_space, weights) = {
            let (Some(src), Some(dst)) = (self.registry.get(from), self.registry.get(to)) else {
                return Ok(());
            };
            let same_space = src.image().read().same_space(&dst.image().read());
            let weights = (same_space && !src.selection().is_empty())
                .then(|| src.selection().get().to_owned());
            (same_space, weights)
        };

        if let Some(src) = self.registry.get_mut(from) {
            src.clear_selection()?;
        }
        if let (true, Some(weights)) = (same_space, weights) {
            debug!("moving selection from {from} to {to}");
            if let Some(dst) = self.registry.get_mut(to) {
                dst.set_selection(weights.view(), [0, 0, 0])?;
            }
        }
        Ok(())
    }

    /// Largest allowed intensity threshold for the current image.
    pub fn threshold_limit(&self) -> Option<f32> {
        self.current
            .and_then(|id| self.image_state.get(&id))
            .map(|state| state.limit)
    }

    /// Images that fills and pastes can be routed to: every other image in
    /// the same space as the current one. Empty in draw mode.
    pub fn compatible_targets(&self, images: &[ImageHandle]) -> Vec<ImageId> {
        let Some(current) = self.current_editor() else {
            return Vec::new();
        };
        if self.settings.draw_mode {
            return Vec::new();
        }

        let current = current.image().read();
        images
            .iter()
            .filter_map(|image| {
                let image = image.read();
                (image.id() != current.id() && image.same_space(&current)).then(|| image.id())
            })
            .collect()
    }

    /// Routes fills, erases and pastes to another image. The target must
    /// be attached and share the current image's space.
    pub fn set_target_image(&mut self, target: Option<ImageId>) -> Result<()> {
        let Some(target) = target else {
            self.target = None;
            return Ok(());
        };

        let current = self
            .current_editor()
            .ok_or_else(|| EditError::InvalidArgument("no image is selected".into()))?;
        if self.settings.draw_mode {
            return Err(EditError::InvalidArgument("target images are not used in draw mode".into()));
        }
        if target == current.image_id() {
            return Err(EditError::InvalidArgument("target image is the current image".into()));
        }
        let editor = self
            .registry
            .get(target)
            .ok_or_else(|| EditError::InvalidArgument(format!("{target} has no editor")))?;
        if !editor.image().read().same_space(&current.image().read()) {
            return Err(EditError::IncompatibleGeometry(format!(
                "{target} is not in the same space as {}",
                current.image_id()
            )));
        }

        self.target = Some(target);
        Ok(())
    }

    /// The editor that image writes will go to, checked so that a routed
    /// write cannot stop halfway. Nothing is moved yet.
    fn routed_editor(&self) -> Result<&Editor> {
        let current = self
            .current_editor()
            .ok_or_else(|| EditError::InvalidArgument("no image is selected".into()))?;
        let editor = match self.target {
            Some(target) if target != current.image_id() => self
                .registry
                .get(target)
                .ok_or_else(|| EditError::InvalidArgument(format!("{target} has no editor")))?,
            _ => current,
        };
        if current.in_change_group() || editor.in_change_group() {
            return Err(EditError::InvalidGroupState("a change group is already open"));
        }
        Ok(editor)
    }

    /// The editor that image writes go to. With a target image set, the
    /// current selection is moved to the target first.
    fn write_editor(&mut self) -> Result<&mut Editor> {
        self.routed_editor()?;
        let current = self.editor_mut()?.image_id();
        match self.target {
            Some(target) if target != current => {
                self.move_selection(current, target)?;
                self.registry
                    .get_mut(target)
                    .ok_or_else(|| EditError::InvalidArgument(format!("{target} has no editor")))
            }
            _ => self.editor_mut(),
        }
    }

    /// A zero-filled image with the geometry of the current image.
    pub fn create_mask(&self) -> Option<Image> {
        let image = self.current_editor()?.image().read();
        Some(image.create_mask(format!("{}_mask", image.name())))
    }

    // Brush

    /// Starts a brush stroke. Everything up to [`end_stroke`](Self::end_stroke)
    /// is one change group.
    pub fn begin_stroke(&mut self) -> Result<()> {
        let draw_mode = self.settings.draw_mode;
        let editor = self.editor_mut()?;
        if draw_mode {
            editor.reset_selection_change();
        }
        editor.start_change_group()
    }

    /// Applies the brush at `voxel`, on the slice perpendicular to `z_axis`
    /// unless the selection is 3D. In draw mode deselecting strokes also
    /// select, since they are erased when the stroke ends.
    pub fn apply_brush(&mut self, voxel: [usize; 3], z_axis: usize, add: bool) -> Result<Option<Region>> {
        check_axis(z_axis)?;
        let settings = self.settings.clone();
        let editor = self.editor_mut()?;

        let (shape, pixdim) = {
            let image = editor.image().read();
            (image.shape(), image.pixdim())
        };
        Region::voxel(voxel).check_within(shape)?;

        let axes: Vec<usize> = if settings.selection_is_3d {
            vec![0, 1, 2]
        } else {
            (0..3).filter(|&axis| axis != z_axis).collect()
        };
        let min_pixdim = pixdim.iter().copied().fold(f64::INFINITY, f64::min);
        let block_size = settings.selection_size as f64 * min_pixdim;

        let Some((block, offset)) = voxel_block(voxel, shape, pixdim, block_size, &axes, Bias::High) else {
            return Ok(None);
        };

        let add = add || settings.draw_mode;
        if add {
            editor.add_to_selection(block.view(), offset, true)?;
        } else {
            editor.remove_from_selection(block.view(), offset, true)?;
        }

        let region = Region::new(offset, shape_of(&block));
        let op = if add { SelectionOp::Select } else { SelectionOp::Deselect };
        self.advisor
            .record(op, Some(region), settings.selection_is_3d, settings.limit_to_radius);
        Ok(Some(region))
    }

    /// Ends a brush stroke. In draw mode the stroke is written to the image
    /// with the fill value, or the erase value if `erase` is set, and the
    /// stroke is removed from the selection.
    pub fn end_stroke(&mut self, erase: bool) -> Result<()> {
        let draw_mode = self.settings.draw_mode;
        let value = if erase {
            self.settings.erase_value
        } else {
            self.settings.fill_value
        };
        let editor = self.editor_mut()?;
        if !editor.in_change_group() {
            return Err(EditError::InvalidGroupState("no brush stroke in progress"));
        }

        let result = if draw_mode {
            draw_stroke(editor, value)
        } else {
            Ok(())
        };
        editor.end_change_group()?;
        result
    }

    // Select by value

    /// Selects voxels with values close to the value at `voxel`, either in
    /// 3D or on the slice perpendicular to `z_axis`.
    ///
    /// Repeated radius-limited calls only clear what the previous call
    /// selected. The clear and the new selection produce one change
    /// notification.
    pub fn select_by_intensity(&mut self, voxel: [usize; 3], z_axis: usize) -> Result<GrowResult> {
        check_axis(z_axis)?;
        let settings = self.settings.clone();
        let is_3d = settings.selection_is_3d;
        let limit = settings.limit_to_radius;

        let shape = self.editor_mut()?.selection().shape();
        Region::voxel(voxel).check_within(shape)?;
        let restrict = (!is_3d).then(|| Region::slice_of(shape, z_axis, voxel[z_axis]));

        let decision = self.advisor.decide(is_3d, limit);
        let params = GrowParams {
            precision: settings.intensity_threshold,
            search_radius: settings.effective_search_radius(),
            local: settings.local_fill,
        };

        let editor = self.editor_mut()?;
        let open_group = !editor.in_change_group();
        if open_group {
            editor.start_change_group()?;
        }

        let result = {
            let mut batch = editor.skip_all();
            grow_selection(&mut batch, voxel, &params, restrict, decision, is_3d)
        };

        if open_group {
            editor.end_change_group()?;
        }
        let grown = result?;

        self.advisor
            .record(SelectionOp::SelectByValue, Some(grown.region()), is_3d, limit);
        Ok(grown)
    }

    // Actions

    /// Fills the selection with the fill value, then clears it.
    pub fn fill_selection(&mut self) -> Result<()> {
        let value = self.settings.fill_value;
        grouped(self.write_editor()?, |editor| {
            editor.fill_selection(value)?;
            editor.clear_selection()
        })
    }

    /// Fills the selection with the erase value, then clears it.
    pub fn erase_selection(&mut self) -> Result<()> {
        let value = self.settings.erase_value;
        grouped(self.write_editor()?, |editor| {
            editor.fill_selection(value)?;
            editor.clear_selection()
        })
    }

    pub fn clear_selection(&mut self) -> Result<()> {
        self.editor_mut()?.clear_selection()
    }

    /// Copies the selected values of the current image to the clipboard.
    pub fn copy_selection(&mut self) -> Result<()> {
        let clipboard = self.editor_mut()?.copy_selection()?;
        self.clipboard = Some(clipboard);
        Ok(())
    }

    /// Pastes the clipboard into the current (or target) image, then clears
    /// the selection. Does nothing without a clipboard or with an empty one.
    /// An incompatible clipboard is rejected before anything changes.
    pub fn paste_selection(&mut self) -> Result<()> {
        let Some(clipboard) = self.clipboard.clone() else {
            return Ok(());
        };
        if clipboard.is_empty() {
            return Ok(());
        }
        {
            let editor = self.routed_editor()?;
            if let Err(err) = clipboard.check_compatible(&editor.image().read()) {
                warn!("paste into {} rejected: {err}", editor.image_id());
                return Err(err);
            }
        }
        grouped(self.write_editor()?, |editor| {
            editor.paste_selection(&clipboard)?;
            editor.clear_selection()
        })
    }

    /// Undoes on the current image. `false` if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        match self.current_editor_mut() {
            Some(editor) => editor.undo(),
            None => Ok(false),
        }
    }

    /// Redoes on the current image. `false` if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        match self.current_editor_mut() {
            Some(editor) => editor.redo(),
            None => Ok(false),
        }
    }

    pub fn can_undo(&self) -> bool {
        self.current_editor().is_some_and(Editor::can_undo)
    }

    pub fn can_redo(&self) -> bool {
        self.current_editor().is_some_and(Editor::can_redo)
    }

    // Settings

    pub fn set_selection_size(&mut self, size: u32) -> u32 {
        let (lo, hi) = SELECTION_SIZE_RANGE;
        self.settings.selection_size = size.clamp(lo, hi);
        self.settings.selection_size
    }

    /// Grows or shrinks the brush by `delta` voxels.
    pub fn adjust_selection_size(&mut self, delta: i32) -> u32 {
        let size = self.settings.selection_size as i64 + delta as i64;
        self.set_selection_size(size.clamp(0, u32::MAX as i64) as u32)
    }

    /// Sets the select-by-value tolerance, clamped to `[0, limit]`.
    pub fn set_intensity_threshold(&mut self, threshold: f32) -> f32 {
        let limit = self.threshold_limit().unwrap_or(f32::INFINITY);
        let threshold = if threshold.is_nan() { 0.0 } else { threshold.clamp(0.0, limit) };
        self.settings.intensity_threshold = threshold;
        threshold
    }

    /// Moves the threshold by `steps` hundredths of the current image's
    /// data range.
    pub fn adjust_threshold(&mut self, steps: i32) -> f32 {
        let range = self
            .current_editor()
            .and_then(|editor| editor.image().read().data_range())
            .map_or(0.0, |(lo, hi)| hi - lo);
        let step = range / THRESHOLD_STEPS;
        self.set_intensity_threshold(self.settings.intensity_threshold + steps as f32 * step)
    }

    pub fn set_search_radius(&mut self, radius: f64) -> f64 {
        let (lo, hi) = SEARCH_RADIUS_RANGE;
        self.settings.search_radius = if radius.is_nan() { lo } else { radius.clamp(lo, hi) };
        self.settings.search_radius
    }

    /// Moves the search radius by `steps` increments of 2.5.
    pub fn adjust_search_radius(&mut self, steps: i32) -> f64 {
        self.set_search_radius(self.settings.search_radius + steps as f64 * RADIUS_STEP)
    }

    pub fn set_selection_is_3d(&mut self, is_3d: bool) {
        self.settings.selection_is_3d = is_3d;
    }

    pub fn set_local_fill(&mut self, local: bool) {
        self.settings.local_fill = local;
    }

    pub fn set_limit_to_radius(&mut self, limit: bool) {
        self.settings.limit_to_radius = limit;
    }

    pub fn set_fill_value(&mut self, value: f32) {
        self.settings.fill_value = value;
    }

    pub fn set_erase_value(&mut self, value: f32) {
        self.settings.erase_value = value;
    }

    /// Switches draw mode. Clears the current selection and the target
    /// image.
    pub fn set_draw_mode(&mut self, draw_mode: bool) -> Result<()> {
        self.settings.draw_mode = draw_mode;
        self.target = None;
        if let Some(editor) = self.current_editor_mut() {
            editor.clear_selection()?;
        }
        Ok(())
    }
}

fn check_axis(axis: usize) -> Result<()> {
    if axis < 3 {
        Ok(())
    } else {
        Err(EditError::InvalidArgument(format!("axis {axis} is not one of 0, 1, 2")))
    }
}

fn shape_of(block: &ndarray::Array3<f32>) -> [usize; 3] {
    crate::volume::dims(&block.view())
}

/// Writes a finished draw-mode stroke to the image and deselects it.
fn draw_stroke(editor: &mut Editor, value: f32) -> Result<()> {
    editor.fill_selection(value)?;
    if let Some(stroke) = editor.last_selection_change().map(|change| change.region()) {
        editor.clear_selection_within(stroke)?;
    }
    Ok(())
}

/// Clears what the merge decision asks for, then grows the new selection.
fn grow_selection(
    editor: &mut Editor,
    voxel: [usize; 3],
    params: &GrowParams,
    restrict: Option<Region>,
    decision: MergeDecision,
    is_3d: bool,
) -> Result<GrowResult> {
    match decision {
        MergeDecision::Skip => {}
        MergeDecision::Clear => match restrict {
            Some(slice) => editor.clear_selection_within(slice)?,
            None => editor.clear_selection()?,
        },
        MergeDecision::Merge(region) => match restrict {
            Some(slice) if !is_3d => editor.clear_selection_within(slice)?,
            _ => editor.clear_selection_within(region)?,
        },
    }
    editor.select_by_value(voxel, params, restrict, decision != MergeDecision::Skip)
}
