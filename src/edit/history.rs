//! Grouped undo/redo history of voxel block changes.
//!
//! Changes are collected into [`ChangeGroup`]s, each one user-visible
//! operation. Groups are opened and closed explicitly by the caller;
//! changes recorded while no group is open form a group of their own.
//! Undo and redo act on whole groups.

use std::collections::VecDeque;

use log::debug;

use crate::error::{EditError, Result};
use crate::volume::{BlockChange, Region};

/// Default maximum number of undo groups.
pub const DEFAULT_MAX_UNDO: usize = 100;

/// What a change was made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTarget {
    /// The selection mask.
    Selection,
    /// One volume of the target image.
    Image { volume: usize },
}

/// One recorded block change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub target: ChangeTarget,
    pub change: BlockChange,
}

/// Ordered changes undone and redone as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeGroup {
    records: Vec<ChangeRecord>,
}

impl ChangeGroup {
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes held by the snapshots of every record.
    pub fn memory_size(&self) -> usize {
        self.records.iter().map(|r| r.change.memory_size()).sum()
    }

    /// Union of the regions this group touched on `target`.
    pub fn region(&self, target: ChangeTarget) -> Option<Region> {
        self.records
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.change.region())
            .reduce(|a, b| a.union(&b))
    }
}

/// Undo and redo stacks plus the currently open group.
///
/// The undo stack is bounded; once it holds more than `max_undo` groups the
/// oldest is dropped. Recording a new group clears the redo stack.
#[derive(Debug)]
pub struct ChangeHistory {
    undo_stack: VecDeque<ChangeGroup>,
    redo_stack: Vec<ChangeGroup>,
    open: Option<ChangeGroup>,
    max_undo: usize,
    /// Distance from the saved state.
    ///
    /// - `Some(0)`: the current state matches the last save.
    /// - `Some(n)`, `n > 0`: `n` undos reach the saved state.
    /// - `Some(n)`, `n < 0`: `|n|` redos reach the saved state.
    /// - `None`: the saved state can no longer be reached.
    save_distance: Option<i64>,
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO)
    }
}

impl ChangeHistory {
    pub fn new(max_undo: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            open: None,
            max_undo: max_undo.max(1),
            save_distance: Some(0),
        }
    }

    /// Opens a change group. Fails if one is already open.
    pub fn start_group(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Err(EditError::InvalidGroupState("a change group is already open"));
        }
        debug!("change group opened");
        self.open = Some(ChangeGroup::default());
        Ok(())
    }

    /// Closes the open group and pushes it onto the undo stack.
    ///
    /// Returns `false` if the group was empty and therefore discarded.
    /// Fails if no group is open.
    pub fn end_group(&mut self) -> Result<bool> {
        let group = self
            .open
            .take()
            .ok_or(EditError::InvalidGroupState("no change group is open"))?;

        if group.is_empty() {
            debug!("empty change group discarded");
            return Ok(false);
        }

        debug!(
            "change group closed with {} records ({} bytes)",
            group.len(),
            group.memory_size()
        );
        self.push(group);
        Ok(true)
    }

    pub fn in_group(&self) -> bool {
        self.open.is_some()
    }

    /// Appends to the open group, or records a group of its own.
    pub fn record(&mut self, record: ChangeRecord) {
        match &mut self.open {
            Some(group) => group.records.push(record),
            None => self.push(ChangeGroup { records: vec![record] }),
        }
    }

    fn push(&mut self, group: ChangeGroup) {
        self.redo_stack.clear();
        self.save_distance = match self.save_distance {
            Some(d) if d < 0 => None,
            Some(d) => Some(d + 1),
            None => None,
        };

        self.undo_stack.push_back(group);
        self.trim();
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.max_undo {
            self.undo_stack.pop_front();
            if matches!(self.save_distance, Some(d) if d > self.undo_stack.len() as i64) {
                self.save_distance = None;
            }
        }
    }

    /// Removes the group to undo. The caller reverts it and hands it back
    /// through [`finish_undo`](Self::finish_undo).
    pub fn take_undo(&mut self) -> Result<Option<ChangeGroup>> {
        if self.in_group() {
            return Err(EditError::InvalidGroupState("cannot undo while a change group is open"));
        }
        Ok(self.undo_stack.pop_back())
    }

    pub fn finish_undo(&mut self, group: ChangeGroup) {
        self.redo_stack.push(group);
        if let Some(d) = &mut self.save_distance {
            *d -= 1;
        }
    }

    /// Removes the group to redo. The caller re-applies it and hands it
    /// back through [`finish_redo`](Self::finish_redo).
    pub fn take_redo(&mut self) -> Result<Option<ChangeGroup>> {
        if self.in_group() {
            return Err(EditError::InvalidGroupState("cannot redo while a change group is open"));
        }
        Ok(self.redo_stack.pop())
    }

    pub fn finish_redo(&mut self, group: ChangeGroup) {
        self.undo_stack.push_back(group);
        if let Some(d) = &mut self.save_distance {
            *d += 1;
        }
        self.trim();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_undo(&self) -> usize {
        self.max_undo
    }

    /// Changes the undo depth, dropping the oldest groups if needed.
    pub fn set_max_undo(&mut self, max_undo: usize) {
        self.max_undo = max_undo.max(1);
        self.trim();
    }

    /// Marks the current state as saved.
    pub fn mark_saved(&mut self) {
        self.save_distance = Some(0);
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.save_distance != Some(0)
    }

    /// Drops every group, including an open one.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open = None;
        self.save_distance = None;
    }
}
