//! Editor features built on top of the project manager.
//!
//! This crate turns language-service answers into the records an editor
//! displays: inline errors for a file and definition ranges for a cursor.

mod diagnostics;
mod navigation;

pub use diagnostics::ErrorKind;
pub use diagnostics::ErrorReporter;
pub use diagnostics::ReportedError;
pub use diagnostics::ScanResult;
pub use navigation::definition_ranges;
pub use navigation::DefinitionRange;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tsls_conf::ProjectConfig;
    use tsls_conf::ProjectId;
    use tsls_conf::StaticPreferences;
    use tsls_project::DefaultProjectFactory;
    use tsls_project::DirectiveCompiler;
    use tsls_project::ManagerServices;
    use tsls_project::ProjectManager;
    use tsls_source::InMemoryFileSystem;
    use tsls_workspace::EditorWorkingSet;

    /// An initialized manager over an in-memory tree rooted at `/p`.
    pub(crate) async fn manager(
        files: &[(&str, &str)],
        projects: &[(&str, &[&str])],
    ) -> ProjectManager {
        let fs = InMemoryFileSystem::new("/p");
        for (path, content) in files {
            fs.add_file(*path, *content);
        }

        let configs: BTreeMap<ProjectId, ProjectConfig> = projects
            .iter()
            .map(|(id, sources)| {
                let config = ProjectConfig {
                    sources: sources.iter().map(ToString::to_string).collect(),
                    ..ProjectConfig::default()
                };
                (ProjectId::from(*id), config)
            })
            .collect();

        let manager = ProjectManager::new(ManagerServices {
            fs: Arc::new(fs),
            working_set: Arc::new(EditorWorkingSet::new()),
            preferences: Arc::new(StaticPreferences::new(configs)),
            compiler: Arc::new(DirectiveCompiler::new()),
            factory: Arc::new(DefaultProjectFactory),
        });
        manager.init().await.unwrap();
        manager
    }
}
