use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use thiserror::Error;
use tsls_conf::ConfigError;
use tsls_conf::ProjectConfig;
use tsls_source::Callback;
use tsls_source::FileChange;
use tsls_source::FileSystem;
use tsls_source::LineIndex;
use tsls_source::Position;
use tsls_source::Subscription;
use tsls_worker::Queue;
use tsls_workspace::DocumentEdit;
use tsls_workspace::WorkingSet;
use tsls_workspace::WorkingSetChange;

use crate::compiler::Compiler;
use crate::compiler::LanguageService;
use crate::compiler::ServiceFile;
use crate::compiler::ServiceSettings;
use crate::resolve::resolve;
use crate::resolve::Resolution;
use crate::resolve::SourceMatcher;

/// How a project relates to a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectFileKind {
    /// Not part of the project.
    None,
    /// Designated by the configured sources.
    Source,
    /// Pulled in by a reference from another project file.
    Reference,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProjectState {
    Uninitialized,
    Initializing,
    Ready,
    Updating,
    Failed,
    Disposed,
}

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("project has been disposed")]
    Disposed,
    #[error("operation is not valid while the project is {0:?}")]
    InvalidState(ProjectState),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read '{path}'")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create language service")]
    Compiler(#[source] anyhow::Error),
    #[error("project resolution task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Collaborators shared by every project of a manager.
#[derive(Clone)]
pub struct ProjectContext {
    pub fs: Arc<dyn FileSystem>,
    pub working_set: Arc<dyn WorkingSet>,
    pub compiler: Arc<dyn Compiler>,
    /// Signal handling is routed through this queue.
    pub queue: Queue,
}

/// One compilation context: a configuration, the files it resolves to, and
/// the language service built over them.
pub struct Project {
    root: Utf8PathBuf,
    context: ProjectContext,
    inner: Mutex<ProjectInner>,
}

struct ProjectInner {
    state: ProjectState,
    config: ProjectConfig,
    matcher: Option<SourceMatcher>,
    resolution: Resolution,
    service: Option<Arc<dyn LanguageService>>,
    subscriptions: Vec<Subscription>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// An explicit configuration update; only valid on a ready project.
    Update,
    /// A file system or working set signal; may recover a failed project.
    Signal,
}

impl Project {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, config: ProjectConfig, context: ProjectContext) -> Self {
        Self {
            root: root.into(),
            context,
            inner: Mutex::new(ProjectInner {
                state: ProjectState::Uninitialized,
                config,
                matcher: None,
                resolution: Resolution::default(),
                service: None,
                subscriptions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProjectInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> ProjectConfig {
        self.lock().config.clone()
    }

    #[must_use]
    pub fn state(&self) -> ProjectState {
        self.lock().state
    }

    /// Resolve the file set, build the language service and start following
    /// file system and working set changes.
    pub async fn init(self: &Arc<Self>) -> Result<(), ProjectError> {
        let config = {
            let mut inner = self.lock();
            match inner.state {
                ProjectState::Uninitialized => inner.state = ProjectState::Initializing,
                ProjectState::Disposed => return Err(ProjectError::Disposed),
                state => return Err(ProjectError::InvalidState(state)),
            }
            inner.config.clone()
        };

        // Subscribe before resolving so changes made meanwhile are queued
        // behind the initialization.
        let subscriptions = self.subscribe();

        let built = match self.resolve(&config).await {
            Ok((matcher, resolution)) => self
                .create_service(&config, &resolution)
                .await
                .map(|service| (matcher, resolution, service)),
            Err(err) => Err(err),
        };

        let mut inner = self.lock();
        if inner.state == ProjectState::Disposed {
            if let Ok((_, _, service)) = built {
                service.dispose();
            }
            return Err(ProjectError::Disposed);
        }

        match built {
            Ok((matcher, resolution, service)) => {
                tracing::info!(
                    sources = ?config.sources,
                    files = resolution.files.len(),
                    "Initialized project"
                );
                inner.state = ProjectState::Ready;
                inner.matcher = Some(matcher);
                inner.resolution = resolution;
                inner.service = Some(service);
                inner.subscriptions = subscriptions;
                Ok(())
            }
            Err(err) => {
                inner.state = ProjectState::Failed;
                Err(err)
            }
        }
    }

    /// Replace the configuration and patch the language service to match.
    ///
    /// Files that left the project are removed from the service, new ones are
    /// added and changed ones updated. A change of compilation settings
    /// rebuilds the service instead.
    pub async fn update(&self, config: ProjectConfig) -> Result<(), ProjectError> {
        self.reconcile(config, Trigger::Update).await
    }

    /// Re-resolve the current configuration against the file system.
    async fn rescan(&self) -> Result<(), ProjectError> {
        let config = self.config();
        self.reconcile(config, Trigger::Signal).await
    }

    async fn reconcile(&self, config: ProjectConfig, trigger: Trigger) -> Result<(), ProjectError> {
        let (previous, rebuild) = {
            let mut inner = self.lock();
            match (inner.state, trigger) {
                (ProjectState::Ready, _) | (ProjectState::Failed, Trigger::Signal) => {}
                (ProjectState::Disposed, _) => return Err(ProjectError::Disposed),
                (state, _) => return Err(ProjectError::InvalidState(state)),
            }
            let previous = inner.state;
            inner.state = ProjectState::Updating;
            let rebuild = inner.service.is_none() || inner.config.requires_rebuild(&config);
            (previous, rebuild)
        };

        let result = match self.resolve(&config).await {
            Ok((matcher, resolution)) if rebuild => self
                .create_service(&config, &resolution)
                .await
                .map(|service| (matcher, resolution, Some(service))),
            Ok((matcher, resolution)) => Ok((matcher, resolution, None)),
            Err(err) => Err(err),
        };

        let mut inner = self.lock();
        if inner.state == ProjectState::Disposed {
            if let Ok((_, _, Some(service))) = result {
                service.dispose();
            }
            return Err(ProjectError::Disposed);
        }

        match result {
            Ok((matcher, resolution, rebuilt)) => {
                if let Some(service) = rebuilt {
                    tracing::debug!("Rebuilt language service");
                    if let Some(old) = inner.service.replace(service) {
                        old.dispose();
                    }
                } else if let Some(service) = &inner.service {
                    patch(service.as_ref(), &inner.resolution, &resolution);
                }
                inner.config = config;
                inner.matcher = Some(matcher);
                inner.resolution = resolution;
                inner.state = ProjectState::Ready;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    sources = ?config.sources,
                    was = ?previous,
                    "Failed to update project: {err}"
                );
                inner.state = ProjectState::Failed;
                if let Some(service) = inner.service.take() {
                    service.dispose();
                }
                Err(err)
            }
        }
    }

    async fn resolve(
        &self,
        config: &ProjectConfig,
    ) -> Result<(SourceMatcher, Resolution), ProjectError> {
        config.validate()?;
        let matcher = SourceMatcher::new(&self.root, config)?;
        let fs = Arc::clone(&self.context.fs);
        let compiler = Arc::clone(&self.context.compiler);

        tokio::task::spawn_blocking(move || {
            let resolution = resolve(fs.as_ref(), compiler.as_ref(), &matcher)?;
            Ok::<_, ProjectError>((matcher, resolution))
        })
        .await?
    }

    async fn create_service(
        &self,
        config: &ProjectConfig,
        resolution: &Resolution,
    ) -> Result<Arc<dyn LanguageService>, ProjectError> {
        let settings = ServiceSettings::from(config);
        let files: Vec<ServiceFile> = resolution
            .contents
            .iter()
            .map(|(path, content)| ServiceFile {
                path: path.clone(),
                content: Arc::clone(content),
            })
            .collect();
        let compiler = Arc::clone(&self.context.compiler);

        tokio::task::spawn_blocking(move || compiler.create_service(&settings, &files))
            .await?
            .map_err(ProjectError::Compiler)
    }

    #[must_use]
    pub fn file_kind(&self, path: &Utf8Path) -> ProjectFileKind {
        self.lock()
            .resolution
            .files
            .get(path)
            .copied()
            .unwrap_or(ProjectFileKind::None)
    }

    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.file_kind(path) != ProjectFileKind::None
    }

    /// Every source and reference path of the project.
    #[must_use]
    pub fn files(&self) -> BTreeSet<Utf8PathBuf> {
        self.lock().resolution.files.keys().cloned().collect()
    }

    #[must_use]
    pub fn files_of_kind(&self, kind: ProjectFileKind) -> Vec<Utf8PathBuf> {
        self.lock()
            .resolution
            .files
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// The language service, if the project is ready.
    #[must_use]
    pub fn language_service(&self) -> Option<Arc<dyn LanguageService>> {
        let inner = self.lock();
        if inner.state == ProjectState::Ready {
            inner.service.clone()
        } else {
            None
        }
    }

    /// Content of a project file as last seen by the language service.
    #[must_use]
    pub fn content(&self, path: &Utf8Path) -> Option<Arc<str>> {
        self.lock().resolution.contents.get(path).cloned()
    }

    #[must_use]
    pub fn offset_at(&self, path: &Utf8Path, position: Position) -> Option<u32> {
        let content = self.content(path)?;
        LineIndex::new(&content).offset(position, &content)
    }

    #[must_use]
    pub fn position_at(&self, path: &Utf8Path, offset: u32) -> Option<Position> {
        let content = self.content(path)?;
        LineIndex::new(&content).position(offset, &content)
    }

    /// Stop listening for changes and release the language service.
    /// Calling it again does nothing.
    pub fn dispose(&self) {
        let (service, subscriptions) = {
            let mut inner = self.lock();
            if inner.state == ProjectState::Disposed {
                return;
            }
            inner.state = ProjectState::Disposed;
            inner.matcher = None;
            inner.resolution = Resolution::default();
            (inner.service.take(), std::mem::take(&mut inner.subscriptions))
        };

        drop(subscriptions);
        if let Some(service) = service {
            service.dispose();
        }
        tracing::info!(root = %self.root, "Disposed project");
    }

    fn subscribe(self: &Arc<Self>) -> Vec<Subscription> {
        let context = &self.context;
        vec![
            context.fs.subscribe(forward(self, |project, change: FileChange| async move {
                project.on_file_change(change).await
            })),
            context.working_set.subscribe_changes(forward(
                self,
                |project, change: WorkingSetChange| async move {
                    project.on_working_set_change(change).await
                },
            )),
            context.working_set.subscribe_edits(forward(
                self,
                |project, edit: DocumentEdit| async move { project.on_document_edit(edit).await },
            )),
        ]
    }

    async fn on_file_change(&self, change: FileChange) -> Result<(), ProjectError> {
        let relevant = {
            let inner = self.lock();
            if !matches!(inner.state, ProjectState::Ready | ProjectState::Failed) {
                return Ok(());
            }
            match &change {
                FileChange::Added(path) => {
                    inner.matcher.as_ref().is_some_and(|m| m.matches(path))
                        || inner.resolution.missing.contains(path)
                }
                FileChange::Removed(path) | FileChange::Modified(path) => {
                    inner.resolution.files.contains_key(path)
                }
                FileChange::Reset => true,
            }
        };

        if relevant {
            tracing::debug!(?change, "Re-resolving project");
            self.rescan().await
        } else {
            Ok(())
        }
    }

    async fn on_working_set_change(&self, change: WorkingSetChange) -> Result<(), ProjectError> {
        let known: Vec<Utf8PathBuf> = {
            let inner = self.lock();
            if inner.state != ProjectState::Ready {
                return Ok(());
            }
            change
                .paths
                .into_iter()
                .filter(|path| inner.resolution.files.contains_key(path))
                .collect()
        };

        let mut references_changed = false;
        for path in known {
            // The file system sees the open buffer, or the disk once closed.
            match self.context.fs.read_to_string(&path) {
                Ok(content) => references_changed |= self.sync_content(&path, content),
                Err(err) => {
                    tracing::debug!("Could not reload {path}: {err}");
                    references_changed = true;
                }
            }
        }

        if references_changed {
            self.rescan().await
        } else {
            Ok(())
        }
    }

    async fn on_document_edit(&self, edit: DocumentEdit) -> Result<(), ProjectError> {
        let (previous, service) = {
            let inner = self.lock();
            if inner.state != ProjectState::Ready {
                return Ok(());
            }
            match (inner.resolution.contents.get(&edit.path), &inner.service) {
                (Some(content), Some(service)) => (Arc::clone(content), Arc::clone(service)),
                _ => return Ok(()),
            }
        };

        let mut text = previous.to_string();
        for change in &edit.changes {
            let Some(range) = change.range else {
                service.update_file(&edit.path, &change.text);
                text.clone_from(&change.text);
                continue;
            };
            let index = LineIndex::new(&text);
            let span = index
                .offset(range.start, &text)
                .zip(index.offset(range.end, &text))
                .filter(|(start, end)| start <= end);
            let Some((start, end)) = span else {
                break;
            };
            service.edit_file(&edit.path, start, end, &change.text);
            text.replace_range(start as usize..end as usize, &change.text);
        }

        if text != edit.text {
            tracing::debug!("Edit of {} diverged from the buffer, resyncing", edit.path);
            service.update_file(&edit.path, &edit.text);
            text = edit.text;
        }

        let references_changed = self.references_changed(&edit.path, &previous, &text);
        self.lock()
            .resolution
            .contents
            .insert(edit.path, text.into());

        if references_changed {
            self.rescan().await
        } else {
            Ok(())
        }
    }

    /// Store new content for a known file and push it to the service.
    /// Returns whether the file's references changed.
    fn sync_content(&self, path: &Utf8Path, content: String) -> bool {
        let Some(previous) = self.content(path) else {
            return true;
        };
        if *previous == *content {
            return false;
        }

        let references_changed = self.references_changed(path, &previous, &content);
        let mut inner = self.lock();
        if let Some(service) = &inner.service {
            service.update_file(path, &content);
        }
        inner.resolution.contents.insert(path.to_owned(), content.into());
        references_changed
    }

    fn references_changed(&self, path: &Utf8Path, before: &str, after: &str) -> bool {
        let compiler = &self.context.compiler;
        compiler.references(path, before) != compiler.references(path, after)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Project")
            .field("root", &self.root)
            .field("state", &inner.state)
            .field("sources", &inner.config.sources)
            .field("files", &inner.resolution.files.len())
            .finish_non_exhaustive()
    }
}

fn patch(service: &dyn LanguageService, old: &Resolution, new: &Resolution) {
    let mut removed = 0;
    for path in old.contents.keys() {
        if !new.contents.contains_key(path) {
            service.remove_file(path);
            removed += 1;
        }
    }

    let mut added = 0;
    let mut updated = 0;
    for (path, content) in &new.contents {
        match old.contents.get(path) {
            None => {
                service.add_file(path, content);
                added += 1;
            }
            Some(previous) if previous != content => {
                service.update_file(path, content);
                updated += 1;
            }
            Some(_) => {}
        }
    }

    tracing::debug!(added, removed, updated, "Patched language service");
}

/// A callback that queues `handler` for every signal it receives.
///
/// The task is on the queue before the emitter returns, so anything submitted
/// afterwards observes its effect. Only a weak reference to the project is
/// kept.
fn forward<T, F, Fut>(project: &Arc<Project>, handler: F) -> Callback<T>
where
    T: Clone + Send + 'static,
    F: Fn(Arc<Project>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProjectError>> + Send + 'static,
{
    let queue = project.context.queue.clone();
    let project: Weak<Project> = Arc::downgrade(project);
    let handler = Arc::new(handler);

    Box::new(move |signal: &T| {
        let project = project.clone();
        let handler = Arc::clone(&handler);
        let signal = signal.clone();
        let _ = queue.then(move || async move {
            let Some(project) = project.upgrade() else {
                return Ok(());
            };
            (handler.as_ref())(project, signal)
                .await
                .map_err(anyhow::Error::from)
        });
    })
}
