use std::io;
use std::sync::Mutex;
use std::sync::PoisonError;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;

use crate::signal::Callback;
use crate::signal::Signal;
use crate::signal::Subscription;

/// A change observed on the file system below the project root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileChange {
    Added(Utf8PathBuf),
    Removed(Utf8PathBuf),
    Modified(Utf8PathBuf),
    /// Everything may have changed; subscribers should rescan.
    Reset,
}

impl FileChange {
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            FileChange::Added(path) | FileChange::Removed(path) | FileChange::Modified(path) => {
                Some(path)
            }
            FileChange::Reset => None,
        }
    }
}

/// Read access to the files of one project root plus their change stream.
///
/// The core never writes through this trait; it only reads and subscribes.
pub trait FileSystem: Send + Sync {
    fn project_root(&self) -> &Utf8Path;

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String>;

    fn exists(&self, path: &Utf8Path) -> bool;

    /// Every file below the project root, as absolute paths.
    fn list_files(&self) -> io::Result<Vec<Utf8PathBuf>>;

    /// Call `callback` with every change, on the thread reporting it.
    fn subscribe(&self, callback: Callback<FileChange>) -> Subscription;
}

pub struct InMemoryFileSystem {
    root: Utf8PathBuf,
    files: Mutex<FxHashMap<Utf8PathBuf, String>>,
    changes: Signal<FileChange>,
}

impl InMemoryFileSystem {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(FxHashMap::default()),
            changes: Signal::new(),
        }
    }

    /// Add or overwrite a file, notifying subscribers.
    pub fn add_file(&self, path: impl Into<Utf8PathBuf>, content: impl Into<String>) {
        let path = path.into();
        let previous = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), content.into());

        let change = if previous.is_some() {
            FileChange::Modified(path)
        } else {
            FileChange::Added(path)
        };
        self.changes.emit(&change);
    }

    pub fn remove_file(&self, path: &Utf8Path) {
        let removed = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);

        if removed.is_some() {
            self.changes.emit(&FileChange::Removed(path.to_owned()));
        }
    }

    pub fn reset(&self) {
        self.changes.emit(&FileChange::Reset);
    }
}

impl FileSystem for InMemoryFileSystem {
    fn project_root(&self) -> &Utf8Path {
        &self.root
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File not found"))
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    fn list_files(&self) -> io::Result<Vec<Utf8PathBuf>> {
        let mut files: Vec<Utf8PathBuf> = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|path| path.starts_with(&self.root))
            .cloned()
            .collect();
        files.sort();
        Ok(files)
    }

    fn subscribe(&self, callback: Callback<FileChange>) -> Subscription {
        self.changes.subscribe(callback)
    }
}

/// File system backed by [`std::fs`], rooted at the opened folder.
///
/// It does not watch anything by itself; a watcher feeds changes through
/// [`OsFileSystem::notify`].
pub struct OsFileSystem {
    root: Utf8PathBuf,
    changes: Signal<FileChange>,
}

impl OsFileSystem {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            changes: Signal::new(),
        }
    }

    pub fn notify(&self, change: FileChange) {
        tracing::trace!(?change, "File system change");
        self.changes.emit(&change);
    }
}

impl FileSystem for OsFileSystem {
    fn project_root(&self) -> &Utf8Path {
        &self.root
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }

    fn list_files(&self) -> io::Result<Vec<Utf8PathBuf>> {
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("project root '{}' is not a directory", self.root),
            ));
        }

        let mut files = Vec::new();
        for entry in ignore::WalkBuilder::new(&self.root).build() {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            match Utf8PathBuf::from_path_buf(entry.into_path()) {
                Ok(path) => files.push(path),
                Err(path) => tracing::debug!("Skipping non UTF-8 path {}", path.display()),
            }
        }
        files.sort();
        Ok(files)
    }

    fn subscribe(&self, callback: Callback<FileChange>) -> Subscription {
        self.changes.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod in_memory {
        use std::sync::Arc;

        use super::*;

        #[test]
        fn test_read_existing_file() {
            let fs = InMemoryFileSystem::new("/project");
            fs.add_file("/project/a.ts", "file content");

            assert_eq!(
                fs.read_to_string(Utf8Path::new("/project/a.ts")).unwrap(),
                "file content"
            );
        }

        #[test]
        fn test_read_nonexistent_file() {
            let fs = InMemoryFileSystem::new("/project");

            let result = fs.read_to_string(Utf8Path::new("/project/missing.ts"));
            assert!(result.is_err());
            assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
        }

        #[test]
        fn test_list_files_stays_below_root() {
            let fs = InMemoryFileSystem::new("/project");
            fs.add_file("/project/b.ts", "");
            fs.add_file("/project/a.ts", "");
            fs.add_file("/elsewhere/c.ts", "");

            assert_eq!(
                fs.list_files().unwrap(),
                vec![
                    Utf8PathBuf::from("/project/a.ts"),
                    Utf8PathBuf::from("/project/b.ts")
                ]
            );
        }

        #[test]
        fn test_changes_reach_subscribers_immediately() {
            let fs = InMemoryFileSystem::new("/project");
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let _subscription = fs.subscribe(Box::new(move |change: &FileChange| {
                sink.lock().unwrap().push(change.clone());
            }));

            fs.add_file("/project/a.ts", "1");
            assert_eq!(seen.lock().unwrap().len(), 1);
            fs.add_file("/project/a.ts", "2");
            fs.remove_file(Utf8Path::new("/project/a.ts"));
            fs.remove_file(Utf8Path::new("/project/a.ts"));
            fs.reset();

            assert_eq!(
                *seen.lock().unwrap(),
                vec![
                    FileChange::Added("/project/a.ts".into()),
                    FileChange::Modified("/project/a.ts".into()),
                    FileChange::Removed("/project/a.ts".into()),
                    FileChange::Reset,
                ]
            );
        }
    }

    mod os {
        use super::*;

        #[test]
        fn test_list_files_walks_root() {
            let dir = tempfile::tempdir().unwrap();
            let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
            std::fs::create_dir(root.join("src")).unwrap();
            std::fs::write(root.join("src/a.ts"), "").unwrap();
            std::fs::write(root.join("b.ts"), "").unwrap();

            let fs = OsFileSystem::new(root.clone());
            let files = fs.list_files().unwrap();

            assert_eq!(files, vec![root.join("b.ts"), root.join("src/a.ts")]);
            assert!(fs.exists(&root.join("b.ts")));
            assert!(!fs.exists(&root.join("src")));
        }

        #[test]
        fn test_missing_root_is_an_error() {
            let fs = OsFileSystem::new("/definitely/not/here");
            assert!(fs.list_files().is_err());
        }
    }
}
