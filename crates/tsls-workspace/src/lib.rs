mod buffers;
mod fs;
mod watcher;
mod working_set;

pub use buffers::Buffers;
pub use buffers::Document;
pub use fs::WorkspaceFileSystem;
pub use watcher::FileWatcher;
pub use watcher::WatchConfig;
pub use working_set::DocumentEdit;
pub use working_set::EditorWorkingSet;
pub use working_set::TextChange;
pub use working_set::WorkingSet;
pub use working_set::WorkingSetChange;
pub use working_set::WorkingSetChangeKind;
pub use working_set::WorkspaceError;
