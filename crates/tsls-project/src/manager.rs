use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::task::JoinSet;
use tsls_conf::PreferenceSource;
use tsls_conf::ProjectConfig;
use tsls_conf::ProjectId;
use tsls_source::resolve_path;
use tsls_source::FileSystem;
use tsls_source::Subscription;
use tsls_worker::Pending;
use tsls_worker::Queue;
use tsls_workspace::WorkingSet;

use crate::compiler::Compiler;
use crate::project::Project;
use crate::project::ProjectContext;
use crate::project::ProjectError;
use crate::project::ProjectFileKind;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("project manager is already initialized")]
    AlreadyInitialized,
    #[error("project manager has been disposed")]
    Disposed,
    #[error("could not create a project for '{path}'")]
    TempProject {
        path: Utf8PathBuf,
        #[source]
        source: ProjectError,
    },
}

/// Builds the projects a manager registers.
pub trait ProjectFactory: Send + Sync {
    fn create(&self, root: Utf8PathBuf, config: ProjectConfig, context: ProjectContext) -> Project;
}

impl<F> ProjectFactory for F
where
    F: Fn(Utf8PathBuf, ProjectConfig, ProjectContext) -> Project + Send + Sync,
{
    fn create(&self, root: Utf8PathBuf, config: ProjectConfig, context: ProjectContext) -> Project {
        self(root, config, context)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProjectFactory;

impl ProjectFactory for DefaultProjectFactory {
    fn create(&self, root: Utf8PathBuf, config: ProjectConfig, context: ProjectContext) -> Project {
        Project::new(root, config, context)
    }
}

/// Everything a [`ProjectManager`] depends on.
#[derive(Clone)]
pub struct ManagerServices {
    pub fs: Arc<dyn FileSystem>,
    pub working_set: Arc<dyn WorkingSet>,
    pub preferences: Arc<dyn PreferenceSource>,
    pub compiler: Arc<dyn Compiler>,
    pub factory: Arc<dyn ProjectFactory>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initialized,
    Disposed,
}

struct ManagerState {
    lifecycle: Lifecycle,
    /// Set as soon as `dispose` is called; the registry is only torn down
    /// once the queued disposal runs.
    dispose_requested: bool,
    projects: BTreeMap<ProjectId, Arc<Project>>,
    temp: Option<Arc<Project>>,
    config_subscription: Option<Subscription>,
}

struct ManagerInner {
    services: ManagerServices,
    root: Utf8PathBuf,
    queue: Queue,
    state: Mutex<ManagerState>,
}

/// Owns the project registry and the temp project, and routes files to the
/// project that owns them.
///
/// Every operation that reads or changes the registry runs as a task on one
/// ordering [`Queue`], so they observe each other's complete effects in
/// submission order.
#[derive(Clone)]
pub struct ProjectManager {
    inner: Arc<ManagerInner>,
}

impl ProjectManager {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(services: ManagerServices) -> Self {
        let root = services.fs.project_root().to_owned();
        Self {
            inner: Arc::new(ManagerInner {
                services,
                root,
                queue: Queue::new(),
                state: Mutex::new(ManagerState {
                    lifecycle: Lifecycle::Created,
                    dispose_requested: false,
                    projects: BTreeMap::new(),
                    temp: None,
                    config_subscription: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.inner.root
    }

    fn context(&self) -> ProjectContext {
        let services = &self.inner.services;
        ProjectContext {
            fs: Arc::clone(&services.fs),
            working_set: Arc::clone(&services.working_set),
            compiler: Arc::clone(&services.compiler),
            queue: self.inner.queue.clone(),
        }
    }

    /// Start following configuration changes and enqueue the discovery of
    /// every configured project.
    ///
    /// Projects that fail to initialize are logged and left out; the returned
    /// handle only fails when the manager was already initialized or disposed.
    pub fn init(&self) -> Pending<()> {
        {
            let mut state = self.state();
            if state.dispose_requested {
                return self.fail(ManagerError::Disposed);
            }
            if state.lifecycle != Lifecycle::Created {
                return self.fail(ManagerError::AlreadyInitialized);
            }
            state.lifecycle = Lifecycle::Initialized;
            state.config_subscription = Some(self.subscribe_to_config());
        }

        let manager = self.clone();
        self.inner.queue.init(async move {
            manager.create_projects().await;
            Ok(())
        })
    }

    fn fail<T: Send + 'static>(&self, err: ManagerError) -> Pending<T> {
        self.inner.queue.then(move || async move { Err(err.into()) })
    }

    /// Queue a configuration pass for every change, before the call that
    /// made the change returns.
    fn subscribe_to_config(&self) -> Subscription {
        let manager: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        self.inner
            .services
            .preferences
            .subscribe(Box::new(move |_| {
                if let Some(inner) = manager.upgrade() {
                    let _ = ProjectManager { inner }.config_changed();
                }
            }))
    }

    /// The project owning `path`, creating a temp project when no configured
    /// project knows it.
    ///
    /// A configured project listing the file as a source wins over one that
    /// only references it. Failure to initialize the temp project is returned
    /// to the caller.
    pub fn get_project_for_file(&self, path: impl AsRef<Utf8Path>) -> Pending<Arc<Project>> {
        let path = resolve_path(&self.inner.root, path.as_ref().as_str());
        let manager = self.clone();
        self.inner
            .queue
            .then(move || async move { Ok(manager.project_for_file(path).await?) })
    }

    async fn project_for_file(&self, path: Utf8PathBuf) -> Result<Arc<Project>, ManagerError> {
        let stale = {
            let mut state = self.state();
            if state.lifecycle == Lifecycle::Disposed {
                return Err(ManagerError::Disposed);
            }
            if let Some(project) = find_registered(&state.projects, &path) {
                return Ok(project);
            }
            if let Some(temp) = &state.temp {
                if temp.contains(&path) || is_temp_for(temp, &path) {
                    tracing::debug!("Reusing temp project for {path}");
                    return Ok(Arc::clone(temp));
                }
            }
            state.temp.take()
        };

        if let Some(stale) = stale {
            tracing::debug!("Replacing temp project {:?}", stale.config().sources);
            stale.dispose();
        }

        let config = ProjectConfig::single_file(path.as_str());
        let project = Arc::new(self.inner.services.factory.create(
            self.inner.root.clone(),
            config,
            self.context(),
        ));

        if let Err(source) = project.init().await {
            project.dispose();
            return Err(ManagerError::TempProject { path, source });
        }

        tracing::debug!("Created temp project for {path}");
        self.state().temp = Some(Arc::clone(&project));
        Ok(project)
    }

    /// Snapshot of the registered projects, in id order.
    pub fn projects(&self) -> Pending<Vec<(ProjectId, Arc<Project>)>> {
        let manager = self.clone();
        self.inner.queue.then(move || async move {
            let state = manager.state();
            if state.lifecycle == Lifecycle::Disposed {
                return Err(ManagerError::Disposed.into());
            }
            Ok(state
                .projects
                .iter()
                .map(|(id, project)| (id.clone(), Arc::clone(project)))
                .collect())
        })
    }

    pub fn temp_project(&self) -> Pending<Option<Arc<Project>>> {
        let manager = self.clone();
        self.inner.queue.then(move || async move {
            let state = manager.state();
            if state.lifecycle == Lifecycle::Disposed {
                return Err(ManagerError::Disposed.into());
            }
            Ok(state.temp.clone())
        })
    }

    /// Stop following configuration changes and enqueue disposal of every
    /// project. Calling it again settles immediately without releasing
    /// anything twice.
    pub fn dispose(&self) -> Pending<()> {
        let subscription = {
            let mut state = self.state();
            if state.dispose_requested {
                return self.inner.queue.then(|| async { Ok(()) });
            }
            state.dispose_requested = true;
            state.config_subscription.take()
        };
        drop(subscription);

        let manager = self.clone();
        self.inner.queue.then(move || async move {
            manager.dispose_projects();
            Ok(())
        })
    }

    async fn create_projects(&self) {
        let configs = self.inner.services.preferences.projects_config();
        tracing::debug!("Discovering {} configured projects", configs.len());

        let mut set = JoinSet::new();
        for (id, config) in configs {
            let manager = self.clone();
            set.spawn(async move {
                let project = manager.create_project(&id, config).await;
                (id, project)
            });
        }

        let mut created = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Some(project))) => created.push((id, project)),
                Ok((_, None)) => {}
                Err(err) => tracing::error!("Project creation task failed: {err}"),
            }
        }

        self.state().projects.extend(created);
    }

    /// Create and initialize a project, or log why it could not be.
    async fn create_project(&self, id: &ProjectId, config: ProjectConfig) -> Option<Arc<Project>> {
        if let Err(err) = config.validate() {
            tracing::warn!("Skipping project '{id}': {err}");
            return None;
        }

        let project = Arc::new(self.inner.services.factory.create(
            self.inner.root.clone(),
            config,
            self.context(),
        ));

        match project.init().await {
            Ok(()) => {
                tracing::info!("Created project '{id}'");
                Some(project)
            }
            Err(err) => {
                tracing::warn!("Could not create project '{id}': {err}");
                project.dispose();
                None
            }
        }
    }

    fn config_changed(&self) -> Pending<()> {
        let manager = self.clone();
        self.inner.queue.then(move || async move {
            manager.apply_config_change().await;
            Ok(())
        })
    }

    /// Bring the registry in line with the current configuration: dispose
    /// projects whose id disappeared, update the others and create the new
    /// ones. Updates and creations run concurrently.
    async fn apply_config_change(&self) {
        let configs = self.inner.services.preferences.projects_config();

        let (removed, updates) = {
            let mut state = self.state();
            if state.lifecycle == Lifecycle::Disposed {
                return;
            }
            let removed_ids: Vec<ProjectId> = state
                .projects
                .keys()
                .filter(|id| !configs.contains_key(*id))
                .cloned()
                .collect();
            let removed: Vec<(ProjectId, Arc<Project>)> = removed_ids
                .into_iter()
                .filter_map(|id| state.projects.remove(&id).map(|project| (id, project)))
                .collect();
            let updates: Vec<(ProjectId, Arc<Project>)> = state
                .projects
                .iter()
                .map(|(id, project)| (id.clone(), Arc::clone(project)))
                .collect();
            (removed, updates)
        };

        for (id, project) in removed {
            tracing::info!("Removing project '{id}'");
            project.dispose();
        }

        let mut set = JoinSet::new();
        for (id, project) in updates {
            let Some(config) = configs.get(&id).cloned() else {
                continue;
            };
            set.spawn(async move {
                let result = project.update(config).await;
                if let Err(err) = &result {
                    tracing::warn!("Could not update project '{id}': {err}");
                }
                (id, result.is_ok().then_some(project))
            });
        }
        for (id, config) in configs {
            if self.state().projects.contains_key(&id) {
                continue;
            }
            let manager = self.clone();
            set.spawn(async move {
                let project = manager.create_project(&id, config).await;
                (id, project)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => tracing::error!("Configuration change task failed: {err}"),
            }
        }

        let claimed = {
            let mut state = self.state();
            for (id, project) in outcomes {
                match project {
                    Some(project) => {
                        state.projects.insert(id, project);
                    }
                    None => {
                        if let Some(failed) = state.projects.remove(&id) {
                            failed.dispose();
                        }
                    }
                }
            }

            let claimed = state.temp.as_ref().is_some_and(|temp| {
                temp.config().sources.iter().any(|source| {
                    find_registered(&state.projects, Utf8Path::new(source)).is_some()
                })
            });
            if claimed {
                state.temp.take()
            } else {
                None
            }
        };

        if let Some(temp) = claimed {
            tracing::debug!(
                "Temp project {:?} is now claimed, disposing it",
                temp.config().sources
            );
            temp.dispose();
        }
    }

    fn dispose_projects(&self) {
        let (projects, temp) = {
            let mut state = self.state();
            if state.lifecycle == Lifecycle::Disposed {
                return;
            }
            state.lifecycle = Lifecycle::Disposed;
            (std::mem::take(&mut state.projects), state.temp.take())
        };

        for (_, project) in projects {
            project.dispose();
        }
        if let Some(temp) = temp {
            temp.dispose();
        }
        tracing::debug!("Project manager disposed");
    }
}

/// Whether `temp` was created for `path`, even if the file is not on disk.
fn is_temp_for(temp: &Project, path: &Utf8Path) -> bool {
    temp.config()
        .sources
        .iter()
        .any(|source| source == path.as_str())
}

/// The registered project with the strongest claim on `path`: a source
/// claim beats a reference claim. Ties go to the lowest id.
fn find_registered(
    projects: &BTreeMap<ProjectId, Arc<Project>>,
    path: &Utf8Path,
) -> Option<Arc<Project>> {
    let mut referencing = Vec::new();
    for (id, project) in projects {
        match project.file_kind(path) {
            ProjectFileKind::Source => {
                tracing::debug!("{path} is a source of project '{id}'");
                return Some(Arc::clone(project));
            }
            ProjectFileKind::Reference => referencing.push((id, project)),
            ProjectFileKind::None => {}
        }
    }

    let (id, project) = referencing.first()?;
    if referencing.len() > 1 {
        let ids: Vec<&str> = referencing.iter().map(|(id, _)| id.as_str()).collect();
        tracing::debug!("{path} is referenced by several projects {ids:?}, using '{id}'");
    } else {
        tracing::debug!("{path} is referenced by project '{id}'");
    }
    Some(Arc::clone(project))
}
