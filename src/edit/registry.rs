//! One [`Editor`] per editable image.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use super::editor::Editor;
use super::history::DEFAULT_MAX_UNDO;
use crate::volume::{ImageHandle, ImageId};

/// Editors keyed by image identity.
///
/// An editor, with its selection and history, is created when its image is
/// attached and dropped when the image is detached.
#[derive(Debug)]
pub struct EditorRegistry {
    editors: HashMap<ImageId, Editor>,
    max_undo: usize,
}

impl Default for EditorRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO)
    }
}

impl EditorRegistry {
    /// Editors created by this registry keep `max_undo` change groups.
    pub fn new(max_undo: usize) -> Self {
        Self {
            editors: HashMap::new(),
            max_undo,
        }
    }

    /// The editor for `image`, created on first use.
    pub fn attach(&mut self, image: &ImageHandle) -> &mut Editor {
        let id = image.read().id();
        let max_undo = self.max_undo;
        self.editors.entry(id).or_insert_with(|| {
            debug!("attaching editor to {id}");
            Editor::new(Arc::clone(image)).with_max_undo(max_undo)
        })
    }

    /// Drops the editor for `id`, returning it if there was one.
    pub fn detach(&mut self, id: ImageId) -> Option<Editor> {
        let editor = self.editors.remove(&id);
        if editor.is_some() {
            debug!("detached editor from {id}");
        }
        editor
    }

    pub fn get(&self, id: ImageId) -> Option<&Editor> {
        self.editors.get(&id)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut Editor> {
        self.editors.get_mut(&id)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.editors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }

    /// Identities of every attached image, in ascending order.
    pub fn ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<_> = self.editors.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Makes the attached set match `images`: attaches new images and
    /// detaches those no longer present. Returns the detached identities.
    pub fn sync(&mut self, images: &[ImageHandle]) -> Vec<ImageId> {
        let keep: HashSet<ImageId> = images
            .iter()
            .map(|image| self.attach(image).image_id())
            .collect();

        let mut removed: Vec<ImageId> = self
            .editors
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        removed.sort();

        for id in &removed {
            self.detach(*id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Image;
    use ndarray::Array3;

    fn image() -> ImageHandle {
        Image::new("img", Array3::zeros((2, 2, 2)), [1.0; 3]).unwrap().into_handle()
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut registry = EditorRegistry::default();
        let img = image();
        let id = img.read().id();

        registry
            .attach(&img)
            .set_selection(Array3::ones((1, 1, 1)).view(), [0, 0, 0])
            .unwrap();
        // Same editor, selection survives
        assert_eq!(registry.attach(&img).selection().selected_count(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(id));
    }

    #[test]
    fn test_detach() {
        let mut registry = EditorRegistry::default();
        let img = image();
        let id = img.read().id();
        registry.attach(&img);

        assert!(registry.detach(id).is_some());
        assert!(registry.detach(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sync_attaches_and_detaches() {
        let mut registry = EditorRegistry::new(5);
        let (a, b, c) = (image(), image(), image());
        let ids: Vec<_> = [&a, &b, &c].iter().map(|i| i.read().id()).collect();

        assert!(registry.sync(&[a.clone(), b.clone()]).is_empty());
        assert_eq!(registry.ids(), vec![ids[0], ids[1]]);
        assert_eq!(registry.get(ids[0]).unwrap().history().max_undo(), 5);

        let removed = registry.sync(&[b.clone(), c.clone()]);
        assert_eq!(removed, vec![ids[0]]);
        assert_eq!(registry.ids(), vec![ids[1], ids[2]]);
        assert!(registry.get_mut(ids[0]).is_none());
    }
}
