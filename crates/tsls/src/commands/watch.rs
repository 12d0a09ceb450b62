use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tsls_conf::FilePreferences;
use tsls_source::FileChange;
use tsls_source::OsFileSystem;
use tsls_workspace::FileWatcher;
use tsls_workspace::WatchConfig;

use crate::args::Args;
use crate::commands::projects::print_files;
use crate::commands::Command;
use crate::commands::Session;
use crate::exit::Exit;

const CONFIG_FILES: &[&str] = &["tsls.toml", ".tsls.toml"];

#[derive(Debug, Parser)]
pub struct Watch {
    /// Milliseconds to collect file events before acting on them.
    #[arg(long, default_value_t = 250)]
    debounce: u64,
}

impl Command for Watch {
    async fn execute(&self, args: &Args) -> Result<Exit> {
        let session = Session::open(args.global.root.as_deref())?;
        session.manager.init().await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = WatchConfig {
            debounce_ms: self.debounce,
            ..WatchConfig::for_root(session.root.clone())
        };
        let _watcher = FileWatcher::new(config, move |changes| {
            let _ = tx.send(changes);
        })?;
        tracing::info!("Watching {}", session.root);

        print_registry(&session, args.global.quiet).await?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changes = rx.recv() => {
                    let Some(changes) = changes else { break };
                    apply(&session.disk, &session.preferences, changes);
                    print_registry(&session, args.global.quiet).await?;
                }
            }
        }

        session.manager.dispose().await?;
        Ok(Exit::success())
    }
}

/// Route configuration edits to the preferences and everything else to the
/// file system subscribers. Both queue their work before returning, so the
/// registry printed next already reflects it.
fn apply(disk: &OsFileSystem, preferences: &FilePreferences, changes: Vec<FileChange>) {
    for change in changes {
        let is_config = change
            .path()
            .and_then(|path| path.file_name())
            .is_some_and(|name| CONFIG_FILES.contains(&name));
        if is_config {
            if let Err(err) = preferences.reload() {
                tracing::warn!("Keeping previous configuration: {err}");
            }
        } else {
            disk.notify(change);
        }
    }
}

async fn print_registry(session: &Session, quiet: bool) -> Result<()> {
    let projects = session.manager.projects().await?;
    if quiet {
        return Ok(());
    }

    println!("-- {} project(s)", projects.len());
    for (id, project) in &projects {
        println!("{id} ({:?})", project.state());
        print_files(session, project);
    }
    if let Some(temp) = session.manager.temp_project().await? {
        println!("(temp) ({:?})", temp.state());
        print_files(session, &temp);
    }
    Ok(())
}
