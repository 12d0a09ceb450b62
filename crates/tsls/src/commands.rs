mod check;
mod projects;
mod watch;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use clap::Subcommand;
use tsls_conf::FilePreferences;
use tsls_project::DefaultProjectFactory;
use tsls_project::DirectiveCompiler;
use tsls_project::ManagerServices;
use tsls_project::ProjectManager;
use tsls_source::OsFileSystem;
use tsls_workspace::EditorWorkingSet;
use tsls_workspace::WorkspaceFileSystem;

use crate::args::Args;
use crate::exit::Exit;

pub trait Command {
    async fn execute(&self, args: &Args) -> Result<Exit>;
}

#[derive(Debug, Subcommand)]
pub enum TslsCommand {
    /// List configured projects with their files
    Projects(self::projects::Projects),
    /// Report errors for the given files
    Check(self::check::Check),
    /// Follow configuration and file changes until interrupted
    Watch(self::watch::Watch),
}

impl TslsCommand {
    pub async fn execute(&self, args: &Args) -> Result<Exit> {
        match self {
            TslsCommand::Projects(command) => command.execute(args).await,
            TslsCommand::Check(command) => command.execute(args).await,
            TslsCommand::Watch(command) => command.execute(args).await,
        }
    }
}

/// A project manager wired to the OS file system and the `tsls.toml` files
/// under the project root.
pub(crate) struct Session {
    pub root: Utf8PathBuf,
    pub disk: Arc<OsFileSystem>,
    pub preferences: Arc<FilePreferences>,
    pub manager: ProjectManager,
}

impl Session {
    pub fn open(root: Option<&Utf8Path>) -> Result<Self> {
        let root = resolve_project_root(root)?;
        let preferences =
            Arc::new(FilePreferences::load(root.clone()).context("Failed to load settings")?);
        let disk = Arc::new(OsFileSystem::new(root.clone()));
        let working_set = Arc::new(EditorWorkingSet::new());
        let fs = Arc::new(WorkspaceFileSystem::new(
            working_set.buffers(),
            Arc::clone(&disk) as _,
        ));

        let manager = ProjectManager::new(ManagerServices {
            fs,
            working_set,
            preferences: Arc::clone(&preferences) as _,
            compiler: Arc::new(DirectiveCompiler::new()),
            factory: Arc::new(DefaultProjectFactory),
        });

        Ok(Self {
            root,
            disk,
            preferences,
            manager,
        })
    }

    /// `path` relative to the project root when it lies below it.
    pub fn display<'a>(&self, path: &'a Utf8Path) -> &'a Utf8Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

fn resolve_project_root(root: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    let root = match root {
        Some(root) => root.to_owned(),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Utf8PathBuf::from_path_buf(cwd)
                .map_err(|_| anyhow::anyhow!("Current directory is not valid UTF-8"))?
        }
    };
    root.canonicalize_utf8()
        .with_context(|| format!("Project root '{root}' is not accessible"))
}
