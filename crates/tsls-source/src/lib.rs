mod collections;
mod line_index;
mod path;
mod signal;
mod system;

pub use collections::FxDashMap;
pub use line_index::LineIndex;
pub use line_index::Position;
pub use line_index::Range;
pub use path::clean_utf8_path;
pub use path::resolve_path;
pub use signal::Callback;
pub use signal::Signal;
pub use signal::Subscription;
pub use system::FileChange;
pub use system::FileSystem;
pub use system::InMemoryFileSystem;
pub use system::OsFileSystem;
