use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use tsls_ide::ErrorKind;
use tsls_ide::ErrorReporter;
use tsls_source::resolve_path;

use crate::args::Args;
use crate::commands::Command;
use crate::commands::Session;
use crate::exit::Exit;

#[derive(Debug, Parser)]
pub struct Check {
    /// Files to check, relative to the project root or absolute.
    #[arg(required = true)]
    files: Vec<Utf8PathBuf>,
}

impl Command for Check {
    async fn execute(&self, args: &Args) -> Result<Exit> {
        let session = Session::open(args.global.root.as_deref())?;
        session.manager.init().await?;
        let reporter = ErrorReporter::new(session.manager.clone());

        let mut error_count: usize = 0;
        let mut file_count: usize = 0;
        let mut aborted = Vec::new();

        for file in &self.files {
            let path = resolve_path(&session.root, file.as_str());
            let result = reporter.scan_file(&path).await;
            if result.aborted {
                aborted.push(path);
                continue;
            }

            let errors = result
                .errors
                .iter()
                .filter(|error| error.kind == ErrorKind::Error)
                .count();
            if errors > 0 {
                file_count += 1;
                error_count += errors;
            }

            if args.global.quiet {
                continue;
            }
            for error in &result.errors {
                println!(
                    "{}:{}:{}: {} TS{}: {}",
                    session.display(&path),
                    error.pos.line + 1,
                    error.pos.character + 1,
                    label(error.kind),
                    error.code,
                    error.message,
                );
            }
        }

        session.manager.dispose().await?;

        if !aborted.is_empty() {
            let paths: Vec<String> = aborted
                .iter()
                .map(|path| session.display(path).to_string())
                .collect();
            return Ok(Exit::error().with_message(format!(
                "Could not check {}.",
                paths.join(", ")
            )));
        }

        if error_count > 0 {
            let file_word = if file_count == 1 { "file" } else { "files" };
            let error_word = if error_count == 1 { "error" } else { "errors" };
            Ok(Exit::error().with_message(format!(
                "Found {error_count} {error_word} in {file_count} {file_word}."
            )))
        } else {
            Ok(Exit::success())
        }
    }
}

fn label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Error => "error",
        ErrorKind::Warning => "warning",
        ErrorKind::Meta => "info",
    }
}
