use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use tsls_project::ProjectManager;
use tsls_source::resolve_path;
use tsls_source::Position;

/// Lines of a definition, ready to be shown inline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionRange {
    pub path: Utf8PathBuf,
    /// `container.name`, or just `name` for top-level declarations.
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
}

/// Definitions of the symbol under `position` in `path`.
///
/// The declaration the cursor already sits on is left out. An empty list
/// means there is nothing to show.
pub async fn definition_ranges(
    manager: &ProjectManager,
    path: &Utf8Path,
    position: Position,
) -> Result<Vec<DefinitionRange>> {
    let project = manager.get_project_for_file(path).await?;
    let path = resolve_path(manager.root(), path.as_str());

    let Some(service) = project.language_service() else {
        tracing::debug!("No language service for {path}");
        return Ok(Vec::new());
    };
    let Some(offset) = project.offset_at(&path, position) else {
        return Ok(Vec::new());
    };

    let ranges = service
        .definitions_at(&path, offset)?
        .into_iter()
        .filter_map(|definition| {
            let start = project.position_at(&definition.path, definition.start)?;
            let end = project.position_at(&definition.path, definition.end)?;
            let name = match &definition.container_name {
                Some(container) => format!("{container}.{}", definition.name),
                None => definition.name,
            };
            Some(DefinitionRange {
                path: definition.path,
                name,
                line_start: start.line,
                line_end: end.line,
            })
        })
        .filter(|range| range.path != path || range.line_start != position.line)
        .collect();

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_definition_in_referenced_file() {
        let manager = fixtures::manager(
            &[
                ("/p/a.ts", "module Shapes {\n  export class Circle {}\n}\n"),
                (
                    "/p/b.ts",
                    "/// <reference path=\"a.ts\" />\nlet c = new Shapes.Circle();\n",
                ),
            ],
            &[("B", &["b.ts"])],
        )
        .await;

        let ranges = definition_ranges(&manager, Utf8Path::new("/p/b.ts"), Position::new(1, 20))
            .await
            .unwrap();

        assert_eq!(
            ranges,
            vec![DefinitionRange {
                path: "/p/a.ts".into(),
                name: "Shapes.Circle".to_string(),
                line_start: 1,
                line_end: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_declaration_under_cursor_is_dropped() {
        let manager = fixtures::manager(
            &[("/p/a.ts", "function f() {}\nf();\n")],
            &[("A", &["a.ts"])],
        )
        .await;
        let path = Utf8Path::new("/p/a.ts");

        let from_call = definition_ranges(&manager, path, Position::new(1, 0))
            .await
            .unwrap();
        assert_eq!(
            from_call,
            vec![DefinitionRange {
                path: path.to_owned(),
                name: "f".to_string(),
                line_start: 0,
                line_end: 0,
            }]
        );

        let from_declaration = definition_ranges(&manager, path, Position::new(0, 9))
            .await
            .unwrap();
        assert!(from_declaration.is_empty());
    }

    #[tokio::test]
    async fn test_position_past_end_has_no_definitions() {
        let manager = fixtures::manager(&[("/p/a.ts", "let a;\n")], &[("A", &["a.ts"])]).await;

        let ranges = definition_ranges(&manager, Utf8Path::new("/p/a.ts"), Position::new(40, 0))
            .await
            .unwrap();

        assert!(ranges.is_empty());
    }
}
