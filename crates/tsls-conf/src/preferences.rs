use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use camino::Utf8PathBuf;
use tsls_source::Callback;
use tsls_source::Signal;
use tsls_source::Subscription;

use crate::ConfigError;
use crate::ProjectConfig;
use crate::ProjectId;
use crate::Settings;

/// Source of the configured projects and of "configuration changed" signals.
pub trait PreferenceSource: Send + Sync {
    fn projects_config(&self) -> BTreeMap<ProjectId, ProjectConfig>;

    /// Call `callback` after every configuration change, before the call
    /// that changed it returns.
    fn subscribe(&self, callback: Callback<()>) -> Subscription;
}

/// Preferences held in memory, replaced through [`StaticPreferences::set_projects`].
pub struct StaticPreferences {
    projects: Mutex<BTreeMap<ProjectId, ProjectConfig>>,
    changed: Signal<()>,
}

impl StaticPreferences {
    #[must_use]
    pub fn new(projects: BTreeMap<ProjectId, ProjectConfig>) -> Self {
        Self {
            projects: Mutex::new(projects),
            changed: Signal::new(),
        }
    }

    pub fn set_projects(&self, projects: BTreeMap<ProjectId, ProjectConfig>) {
        *self.projects.lock().unwrap_or_else(PoisonError::into_inner) = projects;
        self.changed.emit(&());
    }
}

impl Default for StaticPreferences {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl PreferenceSource for StaticPreferences {
    fn projects_config(&self) -> BTreeMap<ProjectId, ProjectConfig> {
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self, callback: Callback<()>) -> Subscription {
        self.changed.subscribe(callback)
    }
}

/// Preferences read from the `tsls.toml` files of a project root.
pub struct FilePreferences {
    root: Utf8PathBuf,
    settings: Mutex<Settings>,
    changed: Signal<()>,
}

impl FilePreferences {
    pub fn load(root: impl Into<Utf8PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        let settings = Settings::new(&root)?;
        Ok(Self {
            root,
            settings: Mutex::new(settings),
            changed: Signal::new(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the configuration files and notify subscribers.
    ///
    /// On failure the previous settings stay in effect and nobody is notified.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let settings = Settings::new(&self.root)?;
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;
        tracing::debug!("Reloaded project configuration from {}", self.root);
        self.changed.emit(&());
        Ok(())
    }
}

impl PreferenceSource for FilePreferences {
    fn projects_config(&self) -> BTreeMap<ProjectId, ProjectConfig> {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .projects()
            .clone()
    }

    fn subscribe(&self, callback: Callback<()>) -> Subscription {
        self.changed.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    fn count_changes(prefs: &dyn PreferenceSource) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let subscription = prefs.subscribe(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        (count, subscription)
    }

    #[test]
    fn test_static_preferences_notify_on_set() {
        let prefs = StaticPreferences::default();
        let (changes, _subscription) = count_changes(&prefs);

        let mut projects = BTreeMap::new();
        projects.insert(ProjectId::from("a"), ProjectConfig::single_file("a.ts"));
        prefs.set_projects(projects.clone());

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(prefs.projects_config(), projects);
    }

    #[test]
    fn test_file_preferences_reload() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("tsls.toml"), "[projects.a]\nsources = [\"a.ts\"]\n").unwrap();

        let prefs = FilePreferences::load(root.clone()).unwrap();
        let (changes, _subscription) = count_changes(&prefs);
        assert_eq!(prefs.projects_config().len(), 1);

        fs::write(
            root.join("tsls.toml"),
            "[projects.a]\nsources = [\"a.ts\"]\n\n[projects.b]\nsources = [\"b.ts\"]\n",
        )
        .unwrap();
        prefs.reload().unwrap();

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        let ids: Vec<String> = prefs
            .projects_config()
            .keys()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_failed_reload_keeps_previous_settings() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("tsls.toml"), "[projects.a]\nsources = [\"a.ts\"]\n").unwrap();

        let prefs = FilePreferences::load(root.clone()).unwrap();
        let (changes, _subscription) = count_changes(&prefs);

        fs::write(root.join("tsls.toml"), "projects = not_toml").unwrap();
        assert!(prefs.reload().is_err());

        assert_eq!(changes.load(Ordering::SeqCst), 0);
        assert_eq!(prefs.projects_config().len(), 1);
    }
}
