use std::fmt;

use globset::Glob;
use serde::Deserialize;

use crate::ConfigError;

/// Identifier of a configured project, one per `[projects.<id>]` table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(String);

impl ProjectId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageLevel {
    Es3,
    #[default]
    Es5,
    Es6,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    None,
    CommonJs,
    Amd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleResolution {
    #[default]
    Classic,
    Node,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct CompilerFlags {
    pub no_lib: bool,
    pub no_implicit_any: bool,
    pub remove_comments: bool,
    pub declaration: bool,
    pub module: ModuleKind,
}

/// Configuration of one project. Replaced wholesale on every update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub target: LanguageLevel,
    /// Globs or literal paths, relative to the project root or absolute.
    pub sources: Vec<String>,
    pub exclude: Vec<String>,
    pub compiler: CompilerFlags,
    pub module_resolution: ModuleResolution,
}

impl ProjectConfig {
    /// Configuration for a project holding a single, otherwise unmanaged file.
    #[must_use]
    pub fn single_file(path: impl Into<String>) -> Self {
        Self {
            sources: vec![path.into()],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        for pattern in self.sources.iter().chain(&self.exclude) {
            Glob::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// Whether switching to `other` requires a fresh language service rather
    /// than patching the existing one.
    #[must_use]
    pub fn requires_rebuild(&self, other: &ProjectConfig) -> bool {
        self.target != other.target
            || self.compiler != other.compiler
            || self.module_resolution != other.module_resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_defaults() {
        let config = ProjectConfig::single_file("/project/c.ts");
        assert_eq!(config.target, LanguageLevel::Es5);
        assert_eq!(config.sources, vec!["/project/c.ts".to_string()]);
        assert!(config.exclude.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_sources() {
        let config = ProjectConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoSources)));
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = ProjectConfig {
            sources: vec!["src/**/*.ts".to_string()],
            exclude: vec!["src/[".to_string()],
            ..ProjectConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { pattern, .. }) if pattern == "src/["
        ));
    }

    #[test]
    fn test_requires_rebuild_only_for_compiler_settings() {
        let base = ProjectConfig::single_file("a.ts");

        let more_sources = ProjectConfig {
            sources: vec!["a.ts".to_string(), "b.ts".to_string()],
            ..base.clone()
        };
        assert!(!base.requires_rebuild(&more_sources));

        let mut strict = base.clone();
        strict.compiler.no_implicit_any = true;
        assert!(base.requires_rebuild(&strict));
    }
}
