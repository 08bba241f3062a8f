//! Scoped suppression of change notifications.
//!
//! [`SkipAll`] is an RAII guard: while one is alive, change notifications
//! are collected instead of delivered. When the outermost guard drops, one
//! consolidated notification per target is delivered, covering the union
//! of every region changed inside the scope.

use std::ops::{Deref, DerefMut};

use crate::volume::Region;

/// Something that can hold back its notifications.
pub trait Suspend {
    fn suspend(&mut self);
    fn resume(&mut self);
}

/// Guard returned by `skip_all`. Dereferences to the suspended value.
pub struct SkipAll<'a, T: Suspend> {
    inner: &'a mut T,
}

impl<'a, T: Suspend> SkipAll<'a, T> {
    pub(crate) fn new(inner: &'a mut T) -> Self {
        inner.suspend();
        Self { inner }
    }
}

impl<T: Suspend> Deref for SkipAll<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.inner
    }
}

impl<T: Suspend> DerefMut for SkipAll<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.inner
    }
}

impl<T: Suspend> Drop for SkipAll<'_, T> {
    fn drop(&mut self) {
        self.inner.resume();
    }
}

/// Pending notifications, keyed by target, while suppression is active.
#[derive(Debug)]
pub(crate) struct NoticeBatch<K> {
    depth: usize,
    pending: Vec<(K, Region)>,
}

impl<K> Default for NoticeBatch<K> {
    fn default() -> Self {
        Self {
            depth: 0,
            pending: Vec::new(),
        }
    }
}

impl<K: PartialEq + Copy> NoticeBatch<K> {
    pub fn suspend(&mut self) {
        self.depth += 1;
    }

    /// Ends one level of suppression. Returns the consolidated notices once
    /// the outermost level ends.
    pub fn resume(&mut self) -> Vec<(K, Region)> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            std::mem::take(&mut self.pending)
        } else {
            Vec::new()
        }
    }

    #[cfg(test)]
    pub fn is_suspended(&self) -> bool {
        self.depth > 0
    }

    /// Passes the notice through, or folds it into the pending set.
    pub fn defer(&mut self, key: K, region: Region) -> Option<(K, Region)> {
        if self.depth == 0 {
            return Some((key, region));
        }
        match self.pending.iter_mut().find(|(k, _)| *k == key) {
            Some((_, pending)) => *pending = pending.union(&region),
            None => self.pending.push((key, region)),
        }
        None
    }
}
