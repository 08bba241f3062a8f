//! Transactional editing.
//!
//! - **History**: bounded undo/redo of grouped block changes
//! - **Editor**: selection and image edits on one image, with notifications
//! - **Clipboard**: copied selection contents for pasting between images
//! - **Registry**: one editor per editable image
//! - **Session**: current image, target routing, brush and select-by-value

pub mod clipboard;
pub mod editor;
pub mod history;
pub mod registry;
pub mod session;

pub use clipboard::Clipboard;
pub use editor::{ChangeNotice, EditListener, Editor};
pub use history::{ChangeGroup, ChangeHistory, ChangeRecord, ChangeTarget, DEFAULT_MAX_UNDO};
pub use registry::EditorRegistry;
pub use session::EditSession;
