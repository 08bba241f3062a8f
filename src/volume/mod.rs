//! Voxel geometry and the target image.
//!
//! - **Regions**: axis-aligned voxel boxes used for bounds checks, change
//!   tracking and notifications
//! - **Blocks**: before/after snapshots of a rectangular block
//! - **Images**: the 3D/4D voxel buffer being edited, shared via handles
//! - **Brush**: cursor-centred voxel boxes in 2D or 3D

pub mod block;
pub mod brush;
pub mod image;
pub mod region;

pub use block::BlockChange;
pub use brush::{voxel_block, voxel_box, Bias};
pub use image::{same_geometry, DataType, Image, ImageHandle, ImageId, WeakImage};
pub use region::{dims, Region};
