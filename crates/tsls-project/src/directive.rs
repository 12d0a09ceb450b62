//! A compiler that only understands dependency directives.
//!
//! [`DirectiveCompiler`] follows `/// <reference path="..." />` directives and
//! relative `import`/`export ... from`/`require` specifiers. Its language
//! service reports malformed reference directives as syntactic errors and
//! unresolved references as semantic errors, and resolves definitions of
//! top-level declarations by name.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use anyhow::bail;
use anyhow::Result;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;
use tsls_source::clean_utf8_path;

use crate::compiler::Compiler;
use crate::compiler::Definition;
use crate::compiler::Diagnostic;
use crate::compiler::DiagnosticCategory;
use crate::compiler::LanguageService;
use crate::compiler::ServiceFile;
use crate::compiler::ServiceSettings;

const INVALID_REFERENCE_DIRECTIVE: u32 = 1084;
const FILE_NOT_FOUND: u32 = 6053;
const MODULE_NOT_FOUND: u32 = 2307;

const DECLARATION_KEYWORDS: &[&str] = &[
    "class",
    "const",
    "enum",
    "function",
    "interface",
    "let",
    "module",
    "namespace",
    "type",
    "var",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DirectiveKind {
    Reference,
    Import,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Directive {
    kind: DirectiveKind,
    specifier: String,
    /// Byte span of the specifier, quotes excluded.
    start: usize,
    end: usize,
}

impl Directive {
    fn resolve(&self, from: &Utf8Path) -> Option<Utf8PathBuf> {
        let dir = from.parent().unwrap_or(Utf8Path::new(""));
        match self.kind {
            DirectiveKind::Reference => Some(clean_utf8_path(&dir.join(&self.specifier))),
            DirectiveKind::Import => {
                if !(self.specifier.starts_with("./") || self.specifier.starts_with("../")) {
                    return None;
                }
                let target = clean_utf8_path(&dir.join(&self.specifier));
                if target.extension() == Some("ts") {
                    Some(target)
                } else {
                    Some(Utf8PathBuf::from(format!("{target}.ts")))
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Scan {
    directives: Vec<Directive>,
    /// Byte spans of reference directives that could not be parsed.
    malformed: Vec<(usize, usize)>,
}

fn scan(content: &str) -> Scan {
    let mut result = Scan::default();
    let mut line_start = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(rest) = trimmed.strip_prefix("///") {
            if rest.trim_start().starts_with("<reference") {
                let offset = line_start + indent + 3;
                match scan_reference(rest) {
                    Some(Some((start, end))) => result.directives.push(Directive {
                        kind: DirectiveKind::Reference,
                        specifier: rest[start..end].to_string(),
                        start: offset + start,
                        end: offset + end,
                    }),
                    Some(None) => {}
                    None => result
                        .malformed
                        .push((line_start + indent, line_start + line.trim_end().len())),
                }
            }
        } else if !trimmed.starts_with("//") {
            for (start, end) in scan_imports(line) {
                result.directives.push(Directive {
                    kind: DirectiveKind::Import,
                    specifier: line[start..end].to_string(),
                    start: line_start + start,
                    end: line_start + end,
                });
            }
        }

        line_start += line.len();
    }

    result
}

/// `None` for a malformed directive, `Some(None)` for one without a `path`
/// attribute such as `types` or `lib`.
#[allow(clippy::option_option)]
fn scan_reference(rest: &str) -> Option<Option<(usize, usize)>> {
    if !rest.trim_end().ends_with("/>") {
        return None;
    }
    let Some(attr) = rest.find("path=") else {
        return Some(None);
    };
    quoted_at(rest, attr + "path=".len()).map(Some)
}

fn scan_imports(line: &str) -> Vec<(usize, usize)> {
    let mut found = Vec::new();

    for marker in ["from ", "require(", "import "] {
        let mut search = 0;
        while let Some(found_at) = line[search..].find(marker) {
            let after = search + found_at + marker.len();
            if let Some(span) = quoted_at(line, after) {
                found.push(span);
            }
            search = after;
        }
    }

    found.sort_unstable();
    found.dedup();
    found
}

/// Span of the string literal starting at `at`, skipping leading spaces.
fn quoted_at(text: &str, at: usize) -> Option<(usize, usize)> {
    let rest = text.get(at..)?;
    let skipped = rest.len() - rest.trim_start_matches(' ').len();
    let quote = rest[skipped..].chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let start = at + skipped + 1;
    let len = text[start..].find(quote)?;
    Some((start, start + len))
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token<'a> {
    Ident(&'a str, usize, usize),
    Open,
    Close,
}

fn tokenize(content: &str) -> Vec<Token<'_>> {
    let bytes = content.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = content[i..].find('\n').map_or(bytes.len(), |n| i + n);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = content[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
            }
            b'"' | b'\'' | b'`' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j] != b {
                    if bytes[j] == b'\\' {
                        j += 1;
                    }
                    j += 1;
                }
                i = j + 1;
            }
            b'{' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b'}' => {
                tokens.push(Token::Close);
                i += 1;
            }
            _ if is_ident_start(b) => {
                let start = i;
                while i < bytes.len() && is_ident_continue(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(&content[start..i], start, i));
            }
            _ => i += 1,
        }
    }

    tokens
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Declaration {
    name: String,
    container: Option<String>,
    start: usize,
    end: usize,
}

fn declarations(content: &str) -> Vec<Declaration> {
    let tokens = tokenize(content);
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut containers: Vec<(String, usize)> = Vec::new();
    let mut pending_container: Option<String> = None;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Ident(keyword, start, _) if DECLARATION_KEYWORDS.contains(keyword) => {
                if let Some(Token::Ident(name, _, end)) = tokens.get(index + 1) {
                    found.push(Declaration {
                        name: (*name).to_string(),
                        container: containers.last().map(|(name, _)| name.clone()),
                        start: *start,
                        end: *end,
                    });
                    if matches!(*keyword, "module" | "namespace" | "class") {
                        pending_container = Some((*name).to_string());
                    }
                }
            }
            Token::Ident(..) => {}
            Token::Open => {
                depth += 1;
                if let Some(name) = pending_container.take() {
                    containers.push((name, depth));
                }
            }
            Token::Close => {
                if containers.last().is_some_and(|(_, d)| *d == depth) {
                    containers.pop();
                }
                depth = depth.saturating_sub(1);
            }
        }
    }

    found
}

fn identifier_at(content: &str, offset: usize) -> Option<&str> {
    tokenize(content).into_iter().find_map(|token| match token {
        Token::Ident(name, start, end) if start <= offset && offset <= end => Some(name),
        _ => None,
    })
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DirectiveCompiler;

impl DirectiveCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for DirectiveCompiler {
    fn references(&self, path: &Utf8Path, content: &str) -> Vec<Utf8PathBuf> {
        let mut references: Vec<Utf8PathBuf> = scan(content)
            .directives
            .iter()
            .filter_map(|directive| directive.resolve(path))
            .collect();
        references.dedup();
        references
    }

    fn create_service(
        &self,
        settings: &ServiceSettings,
        files: &[ServiceFile],
    ) -> Result<Arc<dyn LanguageService>> {
        tracing::debug!(
            target = ?settings.target,
            files = files.len(),
            "Creating directive language service"
        );
        let files = files
            .iter()
            .map(|file| (file.path.clone(), file.content.to_string()))
            .collect();
        Ok(Arc::new(DirectiveService {
            files: Mutex::new(files),
            disposed: AtomicBool::new(false),
        }))
    }
}

struct DirectiveService {
    files: Mutex<FxHashMap<Utf8PathBuf, String>>,
    disposed: AtomicBool,
}

impl DirectiveService {
    fn files(&self) -> Result<MutexGuard<'_, FxHashMap<Utf8PathBuf, String>>> {
        if self.disposed.load(Ordering::Acquire) {
            bail!("language service has been disposed");
        }
        Ok(self.files.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn content(&self, path: &Utf8Path) -> Result<String> {
        match self.files()?.get(path) {
            Some(content) => Ok(content.clone()),
            None => bail!("'{path}' is not part of this compilation"),
        }
    }
}

impl LanguageService for DirectiveService {
    fn add_file(&self, path: &Utf8Path, content: &str) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_owned(), content.to_string());
    }

    fn update_file(&self, path: &Utf8Path, content: &str) {
        self.add_file(path, content);
    }

    fn edit_file(&self, path: &Utf8Path, start: u32, end: u32, text: &str) {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(content) = files.get_mut(path) else {
            tracing::warn!("Edit for unknown file {path}");
            return;
        };
        let range = start as usize..end as usize;
        if content.get(range.clone()).is_none() {
            tracing::warn!("Edit range {start}..{end} out of bounds for {path}");
            return;
        }
        content.replace_range(range, text);
    }

    fn remove_file(&self, path: &Utf8Path) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    fn syntactic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>> {
        let content = self.content(path)?;
        Ok(scan(&content)
            .malformed
            .into_iter()
            .map(|(start, end)| Diagnostic {
                path: path.to_owned(),
                start: to_u32(start),
                length: to_u32(end - start),
                message: "Invalid 'reference' directive syntax.".to_string(),
                category: DiagnosticCategory::Error,
                code: INVALID_REFERENCE_DIRECTIVE,
            })
            .collect())
    }

    fn semantic_diagnostics(&self, path: &Utf8Path) -> Result<Vec<Diagnostic>> {
        let files = self.files()?;
        let Some(content) = files.get(path) else {
            bail!("'{path}' is not part of this compilation");
        };

        let mut diagnostics = Vec::new();
        for directive in scan(content).directives {
            let Some(target) = directive.resolve(path) else {
                continue;
            };
            if files.contains_key(&target) {
                continue;
            }
            let (message, code) = match directive.kind {
                DirectiveKind::Reference => (format!("File '{target}' not found."), FILE_NOT_FOUND),
                DirectiveKind::Import => (
                    format!("Cannot find module '{}'.", directive.specifier),
                    MODULE_NOT_FOUND,
                ),
            };
            diagnostics.push(Diagnostic {
                path: path.to_owned(),
                start: to_u32(directive.start),
                length: to_u32(directive.end - directive.start),
                message,
                category: DiagnosticCategory::Error,
                code,
            });
        }
        Ok(diagnostics)
    }

    fn definitions_at(&self, path: &Utf8Path, offset: u32) -> Result<Vec<Definition>> {
        let files = self.files()?;
        let Some(content) = files.get(path) else {
            bail!("'{path}' is not part of this compilation");
        };
        let offset = offset as usize;

        let directive = scan(content)
            .directives
            .into_iter()
            .find(|d| d.start <= offset && offset <= d.end);
        if let Some(directive) = directive {
            return Ok(directive
                .resolve(path)
                .filter(|target| files.contains_key(target))
                .map(|target| Definition {
                    name: target.file_name().unwrap_or_default().to_string(),
                    container_name: None,
                    path: target,
                    start: 0,
                    end: 0,
                })
                .into_iter()
                .collect());
        }

        let Some(name) = identifier_at(content, offset) else {
            return Ok(Vec::new());
        };

        let mut paths: Vec<&Utf8PathBuf> = files.keys().collect();
        paths.sort();

        let mut definitions = Vec::new();
        for file in paths {
            for declaration in declarations(&files[file]) {
                if declaration.name == name {
                    definitions.push(Definition {
                        path: file.clone(),
                        name: declaration.name,
                        container_name: declaration.container,
                        start: to_u32(declaration.start),
                        end: to_u32(declaration.end),
                    });
                }
            }
        }
        Ok(definitions)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }
}
