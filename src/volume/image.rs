//! The target image edited through an [`Editor`](crate::edit::Editor).
//!
//! Voxel values are held as `f32` in an `(x, y, z, t)` array; a 3D image
//! has a single volume. The nominal [`DataType`] bounds and rounds values
//! written by edits so that integer images stay integral.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ndarray::{Array3, Array4, ArrayView3, ArrayViewMut3, Axis, Zip};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::region::{dims, Region};
use crate::error::{EditError, Result};

/// Spacing values closer than this are treated as identical.
const PIXDIM_TOLERANCE: f64 = 1e-6;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique identity of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    fn next() -> Self {
        ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// Nominal storage type of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    I16,
    I32,
    #[default]
    F32,
    F64,
}

impl DataType {
    /// Representable range for integer types, `None` for floating point.
    pub fn range(self) -> Option<(f64, f64)> {
        match self {
            DataType::U8 => Some((u8::MIN as f64, u8::MAX as f64)),
            DataType::I16 => Some((i16::MIN as f64, i16::MAX as f64)),
            DataType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
            DataType::F32 | DataType::F64 => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.range().is_some()
    }

    /// Rounds and clamps `value` into this type's range. NaN passes through.
    #[inline]
    pub fn coerce(self, value: f32) -> f32 {
        match self.range() {
            Some((lo, hi)) if !value.is_nan() => (value as f64).round().clamp(lo, hi) as f32,
            _ => value,
        }
    }
}

/// Shared handle to an image. Editors and sessions hold strong handles,
/// clipboards hold a [`WeakImage`].
pub type ImageHandle = Arc<RwLock<Image>>;

/// Weak reference to an image; dangling once every handle is dropped.
pub type WeakImage = Weak<RwLock<Image>>;

/// A 3D or 4D image with voxel spacing.
pub struct Image {
    id: ImageId,
    name: String,
    data: Array4<f32>,
    pixdim: [f64; 3],
    dtype: DataType,
}

impl Image {
    /// Create a 3D image.
    pub fn new(name: impl Into<String>, data: Array3<f32>, pixdim: [f64; 3]) -> Result<Self> {
        Self::new_4d(name, data.insert_axis(Axis(3)), pixdim)
    }

    /// Create a time series; the last axis indexes volumes.
    pub fn new_4d(name: impl Into<String>, data: Array4<f32>, pixdim: [f64; 3]) -> Result<Self> {
        if data.shape().iter().any(|&s| s == 0) {
            return Err(EditError::InvalidArgument(format!(
                "image shape {:?} has an empty axis",
                data.shape()
            )));
        }
        if pixdim.iter().any(|&d| !d.is_finite() || d <= 0.0) {
            return Err(EditError::InvalidArgument(format!(
                "voxel spacing {pixdim:?} must be finite and positive"
            )));
        }

        Ok(Self {
            id: ImageId::next(),
            name: name.into(),
            data,
            pixdim,
            dtype: DataType::default(),
        })
    }

    /// Set the nominal data type, coercing existing values into it.
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        if dtype.is_integer() {
            self.data.mapv_inplace(|v| dtype.coerce(v));
        }
        self.dtype = dtype;
        self
    }

    pub fn into_handle(self) -> ImageHandle {
        Arc::new(RwLock::new(self))
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spatial extent `[x, y, z]`.
    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z, _) = self.data.dim();
        [x, y, z]
    }

    pub fn n_volumes(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn pixdim(&self) -> [f64; 3] {
        self.pixdim
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    fn check_volume(&self, volume: usize) -> Result<()> {
        if volume < self.n_volumes() {
            Ok(())
        } else {
            Err(EditError::InvalidArgument(format!(
                "volume {volume} out of range for {} with {} volumes",
                self.name,
                self.n_volumes()
            )))
        }
    }

    /// One volume of the image.
    pub fn volume(&self, volume: usize) -> Result<ArrayView3<'_, f32>> {
        self.check_volume(volume)?;
        Ok(self.data.index_axis(Axis(3), volume))
    }

    pub(crate) fn volume_mut(&mut self, volume: usize) -> Result<ArrayViewMut3<'_, f32>> {
        self.check_volume(volume)?;
        Ok(self.data.index_axis_mut(Axis(3), volume))
    }

    /// Copy of the values inside `region` of one volume.
    pub fn read_block(&self, region: Region, volume: usize) -> Result<Array3<f32>> {
        region.check_within(self.shape())?;
        Ok(region.slice(self.volume(volume)?).to_owned())
    }

    /// Writes `block` at `offset` into one volume, coercing values to the
    /// image's data type. Nothing is written if the block does not fit.
    pub fn write_block(&mut self, block: ArrayView3<f32>, offset: [usize; 3], volume: usize) -> Result<()> {
        let region = Region::new(offset, dims(&block));
        region.check_within(self.shape())?;
        let dtype = self.dtype;
        let target = region.slice_mut(self.volume_mut(volume)?);
        Zip::from(target).and(&block).for_each(|v, &b| *v = dtype.coerce(b));
        Ok(())
    }

    /// Whether both images share shape and voxel spacing.
    pub fn same_space(&self, other: &Image) -> bool {
        same_geometry(self.shape(), self.pixdim, other.shape(), other.pixdim)
    }

    /// `(min, max)` over all non-NaN voxels, `None` if every voxel is NaN.
    pub fn data_range(&self) -> Option<(f32, f32)> {
        let values = self.data.as_slice_memory_order()?;
        values
            .par_iter()
            .filter(|v| !v.is_nan())
            .fold(
                || None,
                |acc: Option<(f32, f32)>, &v| match acc {
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    None => Some((v, v)),
                },
            )
            .reduce(
                || None,
                |a, b| match (a, b) {
                    (Some((alo, ahi)), Some((blo, bhi))) => Some((alo.min(blo), ahi.max(bhi))),
                    (a, None) => a,
                    (None, b) => b,
                },
            )
    }

    /// A zero-filled 3D image with the same geometry and data type.
    pub fn create_mask(&self, name: impl Into<String>) -> Image {
        let [x, y, z] = self.shape();
        Image {
            id: ImageId::next(),
            name: name.into(),
            data: Array4::zeros((x, y, z, 1)),
            pixdim: self.pixdim,
            dtype: self.dtype,
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shape", &self.shape())
            .field("n_volumes", &self.n_volumes())
            .field("pixdim", &self.pixdim)
            .field("dtype", &self.dtype)
            .finish()
    }
}

/// Geometry comparison shared by [`Image::same_space`] and clipboards.
pub fn same_geometry(
    shape_a: [usize; 3],
    pixdim_a: [f64; 3],
    shape_b: [usize; 3],
    pixdim_b: [f64; 3],
) -> bool {
    shape_a == shape_b
        && pixdim_a
            .iter()
            .zip(pixdim_b.iter())
            .all(|(a, b)| (a - b).abs() <= PIXDIM_TOLERANCE)
}
