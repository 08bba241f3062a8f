//! Voxel selection.
//!
//! - **Mask**: per-voxel selection weights with change tracking
//! - **Region growing**: select-by-value from a seed voxel
//! - **Merge advice**: how repeated select-by-value calls combine
//! - **Notification batching**: scoped suppression of change notices

pub mod mask;
pub mod merge;
pub mod notify;
pub mod region_grow;

pub use mask::{MaskListener, SelectionMask};
pub use merge::{MergeAdvisor, MergeDecision, SelectionOp};
pub use notify::{SkipAll, Suspend};
pub use region_grow::{select_by_value, GrowParams, GrowResult};
