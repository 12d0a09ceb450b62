//! Test doubles for the collaborators of a [`ProjectManager`](crate::ProjectManager).

use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use tsls_conf::ProjectConfig;
use tsls_source::Callback;
use tsls_source::FileChange;
use tsls_source::FileSystem;
use tsls_source::Subscription;

use crate::compiler::Compiler;
use crate::compiler::Definition;
use crate::compiler::Diagnostic;
use crate::compiler::LanguageService;
use crate::compiler::ServiceFile;
use crate::compiler::ServiceSettings;
use crate::manager::ProjectFactory;
use crate::project::Project;
use crate::project::ProjectContext;
use crate::DirectiveCompiler;

/// A call made on a language service built by a [`RecordingCompiler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    Add(Utf8PathBuf),
    Update(Utf8PathBuf),
    Edit {
        path: Utf8PathBuf,
        start: u32,
        end: u32,
        text: String,
    },
    Remove(Utf8PathBuf),
    Dispose,
}

/// [`DirectiveCompiler`] that records every call on the services it builds
/// and can be told to fail building them.
#[derive(Default)]
pub struct RecordingCompiler {
    created: AtomicUsize,
    fail: AtomicBool,
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl RecordingCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn services_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn dispose_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == ServiceCall::Dispose)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Compiler for RecordingCompiler {
    fn references(&self, path: &Utf8Path, content: &str) -> Vec<Utf8PathBuf> {
        DirectiveCompiler.references(path, content)
    }

    fn create_service(
        &self,
        settings: &ServiceSettings,
        files: &[ServiceFile],
    ) -> Result<Arc<dyn LanguageService>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("language service construction failed");
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingService {
            inner: DirectiveCompiler.create_service(settings, files)?,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct RecordingService {
    inner: Arc<dyn LanguageService>,
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl RecordingService {
    fn record(&self, call: ServiceCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl LanguageService for RecordingService {
    fn add_file(&self, path: &Utf8Path, content: &str) {
        self.record(ServiceCall::Add(path.to_owned()));
        self.inner.add_file(path, content);
    }

    fn update_file(&self, path: &Utf8Path, content: &str) {
        self.record(ServiceCall::Update(path.to_owned()));
        self.inner.update_file(path, content);
    }

    fn edit_file(&self, path: &Utf8Path, start: u32, end: u32, text: &str) {
        self.record(ServiceCall::Edit {
            path: path.to_owned(),
            start,
            end,
            text: text.to_string(),
        });
        self.inner.edit_file(path, start, end, text);
    }

    fn remove_file(&self, path: &Utf8Path) {
        self.record(ServiceCall::Remove(path.to_owned()));
        self.inner.remove_file(path);
    }

    fn syntactic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>> {
        self.inner.syntactic_diagnostics(path)
    }

    fn semantic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>> {
        self.inner.semantic_diagnostics(path)
    }

    fn definitions_at(&self, path: &Utf8Path, offset: u32) -> Result<Vec<Definition>> {
        self.inner.definitions_at(path, offset)
    }

    fn dispose(&self) {
        self.record(ServiceCall::Dispose);
        self.inner.dispose();
    }
}

/// Delays every listing and read of the wrapped file system.
pub struct SlowFileSystem {
    inner: Arc<dyn FileSystem>,
    delay: Duration,
}

impl SlowFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl FileSystem for SlowFileSystem {
    fn project_root(&self) -> &Utf8Path {
        self.inner.project_root()
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        std::thread::sleep(self.delay);
        self.inner.read_to_string(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.inner.exists(path)
    }

    fn list_files(&self) -> io::Result<Vec<Utf8PathBuf>> {
        std::thread::sleep(self.delay);
        self.inner.list_files()
    }

    fn subscribe(&self, callback: Callback<FileChange>) -> Subscription {
        self.inner.subscribe(callback)
    }
}

/// Project factory that counts the projects it builds.
#[derive(Default)]
pub struct CountingFactory {
    created: AtomicUsize,
}

impl CountingFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProjectFactory for CountingFactory {
    fn create(&self, root: Utf8PathBuf, config: ProjectConfig, context: ProjectContext) -> Project {
        self.created.fetch_add(1, Ordering::SeqCst);
        Project::new(root, config, context)
    }
}
