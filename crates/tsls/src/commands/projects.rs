use anyhow::Result;
use clap::Parser;
use tsls_project::Project;
use tsls_project::ProjectFileKind;

use crate::args::Args;
use crate::commands::Command;
use crate::commands::Session;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Projects {}

impl Command for Projects {
    async fn execute(&self, args: &Args) -> Result<Exit> {
        let session = Session::open(args.global.root.as_deref())?;
        session.manager.init().await?;
        let projects = session.manager.projects().await?;

        if !args.global.quiet {
            for (id, project) in &projects {
                println!("{id} ({:?})", project.state());
                print_files(&session, project);
            }
        }

        session.manager.dispose().await?;

        if projects.is_empty() {
            return Ok(Exit::success().with_message("No projects configured."));
        }
        Ok(Exit::success())
    }
}

pub(super) fn print_files(session: &Session, project: &Project) {
    for (kind, label) in [
        (ProjectFileKind::Source, "source"),
        (ProjectFileKind::Reference, "reference"),
    ] {
        for path in project.files_of_kind(kind) {
            println!("  {label:<9} {}", session.display(&path));
        }
    }
}
