use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use globset::GlobBuilder;
use globset::GlobSet;
use globset::GlobSetBuilder;
use rustc_hash::FxHashSet;
use tsls_conf::ConfigError;
use tsls_conf::ProjectConfig;
use tsls_source::resolve_path;
use tsls_source::FileSystem;

use crate::compiler::Compiler;
use crate::project::ProjectError;
use crate::project::ProjectFileKind;

/// Decides which paths a configuration designates as sources.
#[derive(Clone, Debug)]
pub(crate) struct SourceMatcher {
    literals: FxHashSet<Utf8PathBuf>,
    globs: GlobSet,
    exclude: GlobSet,
}

impl SourceMatcher {
    pub(crate) fn new(root: &Utf8Path, config: &ProjectConfig) -> Result<Self, ConfigError> {
        let mut literals = FxHashSet::default();
        let mut globs = GlobSetBuilder::new();
        for pattern in &config.sources {
            let resolved = resolve_path(root, pattern);
            if is_glob(pattern) {
                globs.add(compile(resolved.as_str(), pattern)?);
            } else {
                literals.insert(resolved);
            }
        }

        let mut exclude = GlobSetBuilder::new();
        for pattern in &config.exclude {
            exclude.add(compile(resolve_path(root, pattern).as_str(), pattern)?);
        }

        Ok(Self {
            literals,
            globs: build(globs, config.sources.first())?,
            exclude: build(exclude, config.exclude.first())?,
        })
    }

    pub(crate) fn has_globs(&self) -> bool {
        !self.globs.is_empty()
    }

    pub(crate) fn matches(&self, path: &Utf8Path) -> bool {
        (self.literals.contains(path) || self.globs.is_match(path)) && !self.exclude.is_match(path)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn compile(resolved: &str, pattern: &str) -> Result<globset::Glob, ConfigError> {
    GlobBuilder::new(resolved)
        .literal_separator(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn build(builder: GlobSetBuilder, first: Option<&String>) -> Result<GlobSet, ConfigError> {
    builder.build().map_err(|source| ConfigError::InvalidPattern {
        pattern: first.cloned().unwrap_or_default(),
        source,
    })
}

/// The file set of a project at one point in time.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    pub(crate) files: BTreeMap<Utf8PathBuf, ProjectFileKind>,
    pub(crate) contents: BTreeMap<Utf8PathBuf, Arc<str>>,
    /// Referenced paths that do not exist (yet).
    pub(crate) missing: BTreeSet<Utf8PathBuf>,
}

/// Resolve the sources of `matcher` against the file system and follow their
/// references transitively.
pub(crate) fn resolve(
    fs: &dyn FileSystem,
    compiler: &dyn Compiler,
    matcher: &SourceMatcher,
) -> Result<Resolution, ProjectError> {
    let mut sources: BTreeSet<Utf8PathBuf> = matcher
        .literals
        .iter()
        .filter(|path| matcher.matches(path))
        .filter(|path| {
            let exists = fs.exists(path);
            if !exists {
                tracing::debug!("Configured source {path} does not exist");
            }
            exists
        })
        .cloned()
        .collect();

    if matcher.has_globs() {
        let listed = fs.list_files().map_err(|source| ProjectError::Io {
            path: fs.project_root().to_owned(),
            source,
        })?;
        sources.extend(listed.into_iter().filter(|path| matcher.matches(path)));
    }

    let mut resolution = Resolution::default();
    let mut queue: VecDeque<Utf8PathBuf> = VecDeque::new();
    for path in sources {
        resolution.files.insert(path.clone(), ProjectFileKind::Source);
        queue.push_back(path);
    }

    while let Some(path) = queue.pop_front() {
        let content: Arc<str> = read(fs, &path)?.into();
        for reference in compiler.references(&path, &content) {
            if resolution.files.contains_key(&reference) {
                continue;
            }
            if fs.exists(&reference) {
                resolution
                    .files
                    .insert(reference.clone(), ProjectFileKind::Reference);
                queue.push_back(reference);
            } else {
                resolution.missing.insert(reference);
            }
        }
        resolution.contents.insert(path, content);
    }

    Ok(resolution)
}

fn read(fs: &dyn FileSystem, path: &Utf8Path) -> Result<String, ProjectError> {
    fs.read_to_string(path).map_err(|source: io::Error| ProjectError::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use tsls_source::InMemoryFileSystem;

    use super::*;
    use crate::DirectiveCompiler;

    fn config(sources: &[&str], exclude: &[&str]) -> ProjectConfig {
        ProjectConfig {
            sources: sources.iter().map(ToString::to_string).collect(),
            exclude: exclude.iter().map(ToString::to_string).collect(),
            ..ProjectConfig::default()
        }
    }

    #[test]
    fn test_glob_does_not_cross_directories() {
        let matcher = SourceMatcher::new(Utf8Path::new("/p"), &config(&["src/*.ts"], &[])).unwrap();
        assert!(matcher.matches(Utf8Path::new("/p/src/a.ts")));
        assert!(!matcher.matches(Utf8Path::new("/p/src/nested/b.ts")));
    }

    #[test]
    fn test_exclude_wins_over_literal() {
        let matcher = SourceMatcher::new(
            Utf8Path::new("/p"),
            &config(&["a.ts", "src/**/*.ts"], &["a.ts", "src/**/*.spec.ts"]),
        )
        .unwrap();
        assert!(!matcher.matches(Utf8Path::new("/p/a.ts")));
        assert!(!matcher.matches(Utf8Path::new("/p/src/x/a.spec.ts")));
        assert!(matcher.matches(Utf8Path::new("/p/src/x/a.ts")));
    }

    #[test]
    fn test_source_is_never_demoted() {
        let fs = InMemoryFileSystem::new("/p");
        fs.add_file("/p/a.ts", "/// <reference path=\"b.ts\" />\n");
        fs.add_file("/p/b.ts", "/// <reference path=\"a.ts\" />\n/// <reference path=\"c.ts\" />\n");
        fs.add_file("/p/c.ts", "");

        let matcher =
            SourceMatcher::new(Utf8Path::new("/p"), &config(&["a.ts", "b.ts"], &[])).unwrap();
        let resolution = resolve(&fs, &DirectiveCompiler, &matcher).unwrap();

        assert_eq!(
            resolution.files.into_iter().collect::<Vec<_>>(),
            vec![
                (Utf8PathBuf::from("/p/a.ts"), ProjectFileKind::Source),
                (Utf8PathBuf::from("/p/b.ts"), ProjectFileKind::Source),
                (Utf8PathBuf::from("/p/c.ts"), ProjectFileKind::Reference),
            ]
        );
    }

    #[test]
    fn test_missing_references_are_recorded() {
        let fs = InMemoryFileSystem::new("/p");
        fs.add_file("/p/a.ts", "import { x } from './x';\n");

        let matcher = SourceMatcher::new(Utf8Path::new("/p"), &config(&["a.ts"], &[])).unwrap();
        let resolution = resolve(&fs, &DirectiveCompiler, &matcher).unwrap();

        assert_eq!(resolution.files.len(), 1);
        assert!(resolution.missing.contains(Utf8Path::new("/p/x.ts")));
    }
}
