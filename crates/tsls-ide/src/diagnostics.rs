use anyhow::anyhow;
use anyhow::Result;
use camino::Utf8Path;
use tsls_project::Diagnostic;
use tsls_project::DiagnosticCategory;
use tsls_project::Project;
use tsls_project::ProjectManager;
use tsls_source::resolve_path;
use tsls_source::Position;

/// How an editor should present a [`ReportedError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    Warning,
    Meta,
}

impl From<DiagnosticCategory> for ErrorKind {
    fn from(category: DiagnosticCategory) -> Self {
        match category {
            DiagnosticCategory::Error | DiagnosticCategory::NoPrefix => ErrorKind::Error,
            DiagnosticCategory::Warning => ErrorKind::Warning,
            DiagnosticCategory::Message => ErrorKind::Meta,
        }
    }
}

/// A diagnostic placed in the file it was reported for.
///
/// Errors never span lines: `endpos` is on the line of `pos`, `length`
/// characters further.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportedError {
    pub pos: Position,
    pub endpos: Position,
    pub message: String,
    pub kind: ErrorKind,
    pub code: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub errors: Vec<ReportedError>,
    /// Set when the file could not be checked at all.
    pub aborted: bool,
}

impl ScanResult {
    fn aborted() -> Self {
        Self {
            errors: Vec::new(),
            aborted: true,
        }
    }
}

/// Collects the errors of a file from the project that owns it.
#[derive(Clone)]
pub struct ErrorReporter {
    manager: ProjectManager,
}

impl ErrorReporter {
    #[must_use]
    pub fn new(manager: ProjectManager) -> Self {
        Self { manager }
    }

    /// Syntax errors of `path`, or its semantic errors when the syntax is
    /// clean.
    ///
    /// Every failure along the way (no owning project, no language service,
    /// a service error) yields an aborted, empty result.
    pub async fn scan_file(&self, path: &Utf8Path) -> ScanResult {
        match self.collect(path).await {
            Ok(errors) => ScanResult {
                errors,
                aborted: false,
            },
            Err(err) => {
                tracing::debug!("Aborted scan of {path}: {err:#}");
                ScanResult::aborted()
            }
        }
    }

    async fn collect(&self, path: &Utf8Path) -> Result<Vec<ReportedError>> {
        let project = self.manager.get_project_for_file(path).await?;
        let path = resolve_path(self.manager.root(), path.as_str());
        let service = project
            .language_service()
            .ok_or_else(|| anyhow!("project owning {path} has no language service"))?;

        let mut diagnostics = service.syntactic_diagnostics(&path)?;
        if diagnostics.is_empty() {
            diagnostics = service.semantic_diagnostics(&path)?;
        }

        Ok(diagnostics
            .iter()
            .map(|diagnostic| report(&project, diagnostic))
            .collect())
    }
}

fn report(project: &Project, diagnostic: &Diagnostic) -> ReportedError {
    let pos = project
        .position_at(&diagnostic.path, diagnostic.start)
        .unwrap_or_default();
    ReportedError {
        pos,
        endpos: Position::new(pos.line, pos.character.saturating_add(diagnostic.length)),
        message: diagnostic.message.clone(),
        kind: diagnostic.category.into(),
        code: diagnostic.code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_category_mapping() {
        assert_eq!(ErrorKind::from(DiagnosticCategory::Error), ErrorKind::Error);
        assert_eq!(
            ErrorKind::from(DiagnosticCategory::NoPrefix),
            ErrorKind::Error
        );
        assert_eq!(
            ErrorKind::from(DiagnosticCategory::Warning),
            ErrorKind::Warning
        );
        assert_eq!(ErrorKind::from(DiagnosticCategory::Message), ErrorKind::Meta);
    }

    #[tokio::test]
    async fn test_clean_file_has_no_errors() {
        let manager = fixtures::manager(&[("/p/a.ts", "let a = 1;\n")], &[("A", &["a.ts"])]).await;
        let reporter = ErrorReporter::new(manager);

        let result = reporter.scan_file(Utf8Path::new("/p/a.ts")).await;

        assert_eq!(result, ScanResult::default());
    }

    #[tokio::test]
    async fn test_semantic_error_positions() {
        let manager = fixtures::manager(
            &[("/p/a.ts", "let a;\n/// <reference path=\"gone.ts\" />\n")],
            &[("A", &["a.ts"])],
        )
        .await;
        let reporter = ErrorReporter::new(manager);

        let result = reporter.scan_file(Utf8Path::new("/p/a.ts")).await;

        assert!(!result.aborted);
        assert_eq!(
            result.errors,
            vec![ReportedError {
                pos: Position::new(1, 21),
                endpos: Position::new(1, 28),
                message: "File '/p/gone.ts' not found.".to_string(),
                kind: ErrorKind::Error,
                code: 6053,
            }]
        );
    }

    #[tokio::test]
    async fn test_syntax_errors_hide_semantic_errors() {
        let manager = fixtures::manager(
            &[(
                "/p/a.ts",
                "/// <reference path=\"gone.ts\" />\n/// <reference path=\"x.ts\"\n",
            )],
            &[("A", &["a.ts"])],
        )
        .await;
        let reporter = ErrorReporter::new(manager);

        let result = reporter.scan_file(Utf8Path::new("/p/a.ts")).await;

        assert!(!result.aborted);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, 1084);
        assert_eq!(result.errors[0].pos, Position::new(1, 0));
    }

    #[tokio::test]
    async fn test_orphan_file_is_checked_in_temp_project() {
        let manager = fixtures::manager(
            &[("/p/c.ts", "import { d } from './d';\n")],
            &[],
        )
        .await;
        let reporter = ErrorReporter::new(manager);

        let result = reporter.scan_file(Utf8Path::new("c.ts")).await;

        assert!(!result.aborted);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Cannot find module './d'.");
    }

    #[tokio::test]
    async fn test_oversized_length_saturates() {
        let manager =
            fixtures::manager(&[("/p/a.ts", "let a;\nlet b;\n")], &[("A", &["a.ts"])]).await;
        let project = manager.get_project_for_file("/p/a.ts").await.unwrap();

        let reported = report(
            &project,
            &Diagnostic {
                path: "/p/a.ts".into(),
                start: 11,
                length: u32::MAX,
                message: "overflow".to_string(),
                category: DiagnosticCategory::Error,
                code: 1,
            },
        );

        assert_eq!(reported.pos, Position::new(1, 4));
        assert_eq!(reported.endpos, Position::new(1, u32::MAX));
    }

    #[tokio::test]
    async fn test_disposed_manager_aborts() {
        let manager = fixtures::manager(&[("/p/a.ts", "")], &[("A", &["a.ts"])]).await;
        manager.dispose().await.unwrap();
        let reporter = ErrorReporter::new(manager);

        let result = reporter.scan_file(Utf8Path::new("/p/a.ts")).await;

        assert!(result.aborted);
        assert!(result.errors.is_empty());
    }
}
