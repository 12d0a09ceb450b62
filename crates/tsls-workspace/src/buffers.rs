//! Shared buffer storage for open documents
//!
//! [`Buffers`] holds the in-memory content of files open in the editor. The
//! [`EditorWorkingSet`](crate::EditorWorkingSet) writes them and the
//! [`WorkspaceFileSystem`](crate::WorkspaceFileSystem) reads them before
//! falling back to disk.

use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use tsls_source::FxDashMap;

/// Text of an open document together with the editor's version counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    text: Arc<str>,
    version: i32,
}

impl Document {
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>, version: i32) -> Self {
        Self {
            text: text.into(),
            version,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        self.version
    }
}

#[derive(Clone, Debug, Default)]
pub struct Buffers {
    inner: Arc<FxDashMap<Utf8PathBuf, Document>>,
}

impl Buffers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, returning `true` if it was not open before.
    pub fn open(&self, path: Utf8PathBuf, document: Document) -> bool {
        self.inner.insert(path, document).is_none()
    }

    pub fn update(&self, path: Utf8PathBuf, document: Document) {
        self.inner.insert(path, document);
    }

    #[must_use]
    pub fn close(&self, path: &Utf8Path) -> Option<Document> {
        self.inner.remove(path).map(|(_, doc)| doc)
    }

    #[must_use]
    pub fn get(&self, path: &Utf8Path) -> Option<Document> {
        self.inner.get(path).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.inner.contains_key(path)
    }

    #[must_use]
    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        let mut paths: Vec<Utf8PathBuf> = self.inner.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}
