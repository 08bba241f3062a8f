//! Voxel selection and transactional editing for volumetric images.
//!
//! The engine behind interactive 3D/4D image editing in a viewer:
//!
//! - **Selection**: a per-voxel weight mask, brush blocks and
//!   select-by-value region growing
//! - **Editing**: fills, erases, copy and paste driven by the selection
//! - **History**: grouped undo/redo of both image and selection changes
//! - **Notifications**: listeners told which region changed, with scoped
//!   batching so compound edits produce a single notice
//!
//! ## Layout
//! Volumes are indexed `[x, y, z]`. 4D images hold a stack of such
//! volumes; an [`Editor`] edits one volume at a time. Values are `f32` and
//! coerced to the image's [`DataType`] on write.
//!
//! ## Example
//! ```
//! use ndarray::Array3;
//! use voxedit::{EditSession, EditSettings, Image};
//!
//! let image = Image::new("t1", Array3::zeros((16, 16, 16)), [1.0; 3])?.into_handle();
//! let mut session = EditSession::new(EditSettings::default())?;
//! session.sync_images(&[image.clone()]);
//! session.select_image(&image)?;
//!
//! session.begin_stroke()?;
//! session.apply_brush([8, 8, 8], 2, true)?;
//! session.end_stroke(false)?;
//! assert_eq!(image.read().volume(0)?[[8, 8, 8]], 1.0);
//!
//! session.undo()?;
//! assert_eq!(image.read().volume(0)?[[8, 8, 8]], 0.0);
//! # Ok::<(), voxedit::EditError>(())
//! ```

pub mod config;
pub mod edit;
pub mod error;
pub mod selection;
pub mod volume;

pub use config::EditSettings;
pub use edit::{ChangeNotice, ChangeTarget, Clipboard, EditSession, Editor, EditorRegistry};
pub use error::{EditError, Result};
pub use selection::{GrowParams, GrowResult, SelectionMask};
pub use volume::{DataType, Image, ImageHandle, ImageId, Region};

// Python bindings (only when python feature is enabled)
#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray3, PyReadonlyArray3};
    use pyo3::exceptions::{PyIndexError, PyValueError};
    use pyo3::prelude::*;

    use crate::{EditError, EditSession, EditSettings, Image, ImageHandle};

    impl From<EditError> for PyErr {
        fn from(err: EditError) -> PyErr {
            match err {
                EditError::OutOfBounds { .. } => PyIndexError::new_err(err.to_string()),
                _ => PyValueError::new_err(err.to_string()),
            }
        }
    }

    /// Edit session over a single float32 volume.
    ///
    /// Voxel arguments are `(x, y, z)` tuples; `z_axis` names the axis
    /// perpendicular to the slice being edited.
    #[pyclass(name = "EditSession", unsendable)]
    pub struct PyEditSession {
        image: ImageHandle,
        session: EditSession,
    }

    #[pymethods]
    impl PyEditSession {
        #[new]
        #[pyo3(signature = (data, pixdim = (1.0, 1.0, 1.0), settings = None))]
        fn new(
            data: PyReadonlyArray3<'_, f32>,
            pixdim: (f64, f64, f64),
            settings: Option<&str>,
        ) -> PyResult<Self> {
            let settings = match settings {
                Some(json) => EditSettings::from_json(json)?,
                None => EditSettings::default(),
            };
            let image = Image::new("image", data.as_array().to_owned(), [pixdim.0, pixdim.1, pixdim.2])?
                .into_handle();
            let mut session = EditSession::new(settings)?;
            session.sync_images(std::slice::from_ref(&image));
            session.select_image(&image)?;
            Ok(Self { image, session })
        }

        /// Copy of the image volume.
        fn data<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray3<f32>>> {
            let data = self.image.read().volume(0)?.to_owned();
            Ok(data.into_pyarray(py))
        }

        /// Copy of the selection weights.
        fn selection<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray3<f32>>> {
            let editor = self
                .session
                .current_editor()
                .ok_or_else(|| PyValueError::new_err("no image is selected"))?;
            Ok(editor.selection().get().to_owned().into_pyarray(py))
        }

        fn settings(&self) -> PyResult<String> {
            Ok(self.session.settings().to_json()?)
        }

        fn begin_stroke(&mut self) -> PyResult<()> {
            Ok(self.session.begin_stroke()?)
        }

        #[pyo3(signature = (voxel, z_axis = 2, add = true))]
        fn apply_brush(&mut self, voxel: (usize, usize, usize), z_axis: usize, add: bool) -> PyResult<bool> {
            let region = self.session.apply_brush([voxel.0, voxel.1, voxel.2], z_axis, add)?;
            Ok(region.is_some())
        }

        #[pyo3(signature = (erase = false))]
        fn end_stroke(&mut self, erase: bool) -> PyResult<()> {
            Ok(self.session.end_stroke(erase)?)
        }

        /// Returns the number of voxels selected.
        #[pyo3(signature = (voxel, z_axis = 2))]
        fn select_by_intensity(&mut self, voxel: (usize, usize, usize), z_axis: usize) -> PyResult<usize> {
            let grown = self.session.select_by_intensity([voxel.0, voxel.1, voxel.2], z_axis)?;
            Ok(grown.count)
        }

        fn fill_selection(&mut self) -> PyResult<()> {
            Ok(self.session.fill_selection()?)
        }

        fn erase_selection(&mut self) -> PyResult<()> {
            Ok(self.session.erase_selection()?)
        }

        fn clear_selection(&mut self) -> PyResult<()> {
            Ok(self.session.clear_selection()?)
        }

        fn copy_selection(&mut self) -> PyResult<()> {
            Ok(self.session.copy_selection()?)
        }

        fn paste_selection(&mut self) -> PyResult<()> {
            Ok(self.session.paste_selection()?)
        }

        fn undo(&mut self) -> PyResult<bool> {
            Ok(self.session.undo()?)
        }

        fn redo(&mut self) -> PyResult<bool> {
            Ok(self.session.redo()?)
        }

        fn set_intensity_threshold(&mut self, threshold: f32) -> f32 {
            self.session.set_intensity_threshold(threshold)
        }

        fn set_selection_size(&mut self, size: u32) -> u32 {
            self.session.set_selection_size(size)
        }

        fn set_search_radius(&mut self, radius: f64) -> f64 {
            self.session.set_search_radius(radius)
        }

        fn set_draw_mode(&mut self, draw_mode: bool) -> PyResult<()> {
            Ok(self.session.set_draw_mode(draw_mode)?)
        }
    }

    #[pymodule]
    pub fn voxedit(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyEditSession>()?;
        Ok(())
    }
}

#[cfg(feature = "python")]
pub use python::voxedit;
