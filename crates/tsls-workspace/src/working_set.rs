use camino::Utf8Path;
use camino::Utf8PathBuf;
use thiserror::Error;
use tsls_source::Callback;
use tsls_source::LineIndex;
use tsls_source::Range;
use tsls_source::Signal;
use tsls_source::Subscription;

use crate::buffers::Buffers;
use crate::buffers::Document;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkingSetChangeKind {
    Add,
    Remove,
}

/// Files entering or leaving the editor's working set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingSetChange {
    pub kind: WorkingSetChangeKind,
    pub paths: Vec<Utf8PathBuf>,
}

/// One replacement inside a document. Without a range the whole text is replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub range: Option<Range>,
    pub text: String,
}

impl TextChange {
    #[must_use]
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn replace(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

/// An edit applied to an open document. `text` is the document after the edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentEdit {
    pub path: Utf8PathBuf,
    pub changes: Vec<TextChange>,
    pub text: String,
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Document '{0}' is not open")]
    NotOpen(Utf8PathBuf),
    #[error("Invalid range in text change for '{0}'")]
    InvalidRange(Utf8PathBuf),
}

/// The set of files currently open in the editor.
pub trait WorkingSet: Send + Sync {
    fn files(&self) -> Vec<Utf8PathBuf>;

    fn subscribe_changes(&self, callback: Callback<WorkingSetChange>) -> Subscription;

    fn subscribe_edits(&self, callback: Callback<DocumentEdit>) -> Subscription;
}

/// Working set fed by editor open/change/close notifications.
pub struct EditorWorkingSet {
    buffers: Buffers,
    changes: Signal<WorkingSetChange>,
    edits: Signal<DocumentEdit>,
}

impl EditorWorkingSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: Buffers::new(),
            changes: Signal::new(),
            edits: Signal::new(),
        }
    }

    /// Buffers shared with a [`WorkspaceFileSystem`](crate::WorkspaceFileSystem).
    #[must_use]
    pub fn buffers(&self) -> Buffers {
        self.buffers.clone()
    }

    pub fn open(&self, path: impl Into<Utf8PathBuf>, text: impl Into<String>, version: i32) {
        let path = path.into();
        let text: String = text.into();
        if self
            .buffers
            .open(path.clone(), Document::new(text, version))
        {
            self.changes.emit(&WorkingSetChange {
                kind: WorkingSetChangeKind::Add,
                paths: vec![path],
            });
        }
    }

    pub fn edit(
        &self,
        path: &Utf8Path,
        version: i32,
        changes: Vec<TextChange>,
    ) -> Result<(), WorkspaceError> {
        let document = self
            .buffers
            .get(path)
            .ok_or_else(|| WorkspaceError::NotOpen(path.to_owned()))?;

        let text = apply_changes(document.text().to_string(), &changes)
            .ok_or_else(|| WorkspaceError::InvalidRange(path.to_owned()))?;

        self.buffers
            .update(path.to_owned(), Document::new(text.as_str(), version));

        self.edits.emit(&DocumentEdit {
            path: path.to_owned(),
            changes,
            text,
        });
        Ok(())
    }

    pub fn close(&self, path: &Utf8Path) {
        if self.buffers.close(path).is_some() {
            self.changes.emit(&WorkingSetChange {
                kind: WorkingSetChangeKind::Remove,
                paths: vec![path.to_owned()],
            });
        }
    }
}

impl Default for EditorWorkingSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingSet for EditorWorkingSet {
    fn files(&self) -> Vec<Utf8PathBuf> {
        self.buffers.paths()
    }

    fn subscribe_changes(&self, callback: Callback<WorkingSetChange>) -> Subscription {
        self.changes.subscribe(callback)
    }

    fn subscribe_edits(&self, callback: Callback<DocumentEdit>) -> Subscription {
        self.edits.subscribe(callback)
    }
}

/// Apply text changes in order, each against the result of the previous one.
#[must_use]
fn apply_changes(mut content: String, changes: &[TextChange]) -> Option<String> {
    for change in changes {
        if let Some(range) = change.range {
            let index = LineIndex::new(&content);
            let start = index.offset(range.start, &content)? as usize;
            let end = index.offset(range.end, &content)? as usize;
            if start > end {
                return None;
            }

            let mut updated = String::with_capacity(content.len() - (end - start) + change.text.len());
            updated.push_str(&content[..start]);
            updated.push_str(&change.text);
            updated.push_str(&content[end..]);
            content = updated;
        } else {
            content.clone_from(&change.text);
        }
    }
    Some(content)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use tsls_source::Position;

    use super::*;

    fn record<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Callback<T>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Callback<T> = Box::new(move |value: &T| {
            sink.lock().unwrap().push(value.clone());
        });
        (seen, callback)
    }

    #[test]
    fn test_open_and_close_emit_changes() {
        let ws = EditorWorkingSet::new();
        let (seen, callback) = record();
        let _subscription = ws.subscribe_changes(callback);

        ws.open("/p/a.ts", "let a;", 1);
        ws.open("/p/a.ts", "let a;", 2);
        ws.close(Utf8Path::new("/p/a.ts"));
        ws.close(Utf8Path::new("/p/a.ts"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                WorkingSetChange {
                    kind: WorkingSetChangeKind::Add,
                    paths: vec!["/p/a.ts".into()],
                },
                WorkingSetChange {
                    kind: WorkingSetChangeKind::Remove,
                    paths: vec!["/p/a.ts".into()],
                },
            ]
        );
        assert!(ws.files().is_empty());
    }

    #[test]
    fn test_edit_applies_incremental_change() {
        let ws = EditorWorkingSet::new();
        let (seen, callback) = record::<DocumentEdit>();
        let _subscription = ws.subscribe_edits(callback);
        ws.open("/p/a.ts", "let a = 1;\nlet b = 2;", 1);

        let change = TextChange::replace(
            Range::new(Position::new(1, 8), Position::new(1, 9)),
            "42",
        );
        ws.edit(Utf8Path::new("/p/a.ts"), 2, vec![change.clone()])
            .unwrap();

        let edits = seen.lock().unwrap();
        assert_eq!(edits.len(), 1);
        let edit = &edits[0];
        assert_eq!(edit.text, "let a = 1;\nlet b = 42;");
        assert_eq!(edit.changes, vec![change]);
        assert_eq!(
            ws.buffers().get(Utf8Path::new("/p/a.ts")).unwrap().version(),
            2
        );
    }

    #[test]
    fn test_edit_requires_open_document() {
        let ws = EditorWorkingSet::new();
        let result = ws.edit(Utf8Path::new("/p/a.ts"), 1, vec![TextChange::full("x")]);
        assert!(matches!(result, Err(WorkspaceError::NotOpen(_))));
    }

    #[test]
    fn test_apply_full_then_incremental() {
        let changes = vec![
            TextChange::full("abc"),
            TextChange::replace(Range::new(Position::new(0, 1), Position::new(0, 2)), "X"),
        ];
        assert_eq!(apply_changes("old".to_string(), &changes).unwrap(), "aXc");
    }

    #[test]
    fn test_apply_rejects_invalid_range() {
        let changes = vec![TextChange::replace(
            Range::new(Position::new(5, 0), Position::new(5, 1)),
            "x",
        )];
        assert!(apply_changes("abc".to_string(), &changes).is_none());
    }
}
