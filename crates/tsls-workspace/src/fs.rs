use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use tsls_source::Callback;
use tsls_source::FileChange;
use tsls_source::FileSystem;
use tsls_source::Subscription;

use crate::buffers::Buffers;

/// File system that reads open buffers before falling back to disk.
///
/// Listing and change notifications come from the disk layer only; a buffer
/// for a file that does not exist on disk never makes it part of a project
/// scan, but it can still be read once something references it.
pub struct WorkspaceFileSystem {
    buffers: Buffers,
    disk: Arc<dyn FileSystem>,
}

impl WorkspaceFileSystem {
    pub fn new(buffers: Buffers, disk: Arc<dyn FileSystem>) -> Self {
        Self { buffers, disk }
    }
}

impl FileSystem for WorkspaceFileSystem {
    fn project_root(&self) -> &Utf8Path {
        self.disk.project_root()
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        if let Some(document) = self.buffers.get(path) {
            return Ok(document.text().to_string());
        }
        self.disk.read_to_string(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.buffers.contains(path) || self.disk.exists(path)
    }

    fn list_files(&self) -> io::Result<Vec<Utf8PathBuf>> {
        self.disk.list_files()
    }

    fn subscribe(&self, callback: Callback<FileChange>) -> Subscription {
        self.disk.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use tsls_source::InMemoryFileSystem;

    use super::*;
    use crate::buffers::Document;

    fn setup() -> (Buffers, WorkspaceFileSystem) {
        let disk = InMemoryFileSystem::new("/p");
        disk.add_file("/p/a.ts", "disk content");
        let buffers = Buffers::new();
        let fs = WorkspaceFileSystem::new(buffers.clone(), Arc::new(disk));
        (buffers, fs)
    }

    #[test]
    fn test_reads_disk_without_buffer() {
        let (_, fs) = setup();
        assert_eq!(
            fs.read_to_string(Utf8Path::new("/p/a.ts")).unwrap(),
            "disk content"
        );
    }

    #[test]
    fn test_buffer_takes_precedence() {
        let (buffers, fs) = setup();
        buffers.open("/p/a.ts".into(), Document::new("buffer content", 1));

        assert_eq!(
            fs.read_to_string(Utf8Path::new("/p/a.ts")).unwrap(),
            "buffer content"
        );

        let _ = buffers.close(Utf8Path::new("/p/a.ts"));
        assert_eq!(
            fs.read_to_string(Utf8Path::new("/p/a.ts")).unwrap(),
            "disk content"
        );
    }

    #[test]
    fn test_unsaved_buffer_exists_but_is_not_listed() {
        let (buffers, fs) = setup();
        buffers.open("/p/new.ts".into(), Document::new("", 1));

        assert!(fs.exists(Utf8Path::new("/p/new.ts")));
        assert_eq!(fs.list_files().unwrap(), vec![Utf8PathBuf::from("/p/a.ts")]);
    }
}
