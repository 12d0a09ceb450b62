//! Boundary to the compiler and its language service.
//!
//! The project layer never parses or type checks anything itself. It asks a
//! [`Compiler`] for the direct references of a file and for a
//! [`LanguageService`] built over a resolved file set, then keeps that service
//! in sync as files change.

use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use tsls_conf::CompilerFlags;
use tsls_conf::LanguageLevel;
use tsls_conf::ModuleResolution;
use tsls_conf::ProjectConfig;

/// The part of a [`ProjectConfig`] that shapes compilation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceSettings {
    pub target: LanguageLevel,
    pub compiler: CompilerFlags,
    pub module_resolution: ModuleResolution,
}

impl From<&ProjectConfig> for ServiceSettings {
    fn from(config: &ProjectConfig) -> Self {
        Self {
            target: config.target,
            compiler: config.compiler.clone(),
            module_resolution: config.module_resolution,
        }
    }
}

/// A file handed to [`Compiler::create_service`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceFile {
    pub path: Utf8PathBuf,
    pub content: Arc<str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Message,
    NoPrefix,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: Utf8PathBuf,
    /// Byte offset of the first character.
    pub start: u32,
    pub length: u32,
    pub message: String,
    pub category: DiagnosticCategory,
    pub code: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    pub path: Utf8PathBuf,
    pub name: String,
    pub container_name: Option<String>,
    /// Byte offsets in `path`.
    pub start: u32,
    pub end: u32,
}

pub trait Compiler: Send + Sync {
    /// Files directly referenced by `path`, as absolute paths. They need not
    /// exist.
    fn references(&self, path: &Utf8Path, content: &str) -> Vec<Utf8PathBuf>;

    fn create_service(
        &self,
        settings: &ServiceSettings,
        files: &[ServiceFile],
    ) -> Result<Arc<dyn LanguageService>>;
}

/// Query interface of one compilation context.
///
/// Offsets are byte offsets into the current file content.
pub trait LanguageService: Send + Sync {
    fn add_file(&self, path: &Utf8Path, content: &str);

    fn update_file(&self, path: &Utf8Path, content: &str);

    /// Replace `start..end` with `text`.
    fn edit_file(&self, path: &Utf8Path, start: u32, end: u32, text: &str);

    fn remove_file(&self, path: &Utf8Path);

    fn syntactic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>>;

    fn semantic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>>;

    fn definitions_at(&self, path: &Utf8Path, offset: u32) -> Result<Vec<Definition>>;

    /// Release the compilation context. Called exactly once by the owner.
    fn dispose(&self);
}
