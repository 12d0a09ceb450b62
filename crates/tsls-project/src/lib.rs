mod compiler;
mod directive;
mod manager;
mod project;
mod resolve;
pub mod testing;

pub use compiler::Compiler;
pub use compiler::Definition;
pub use compiler::Diagnostic;
pub use compiler::DiagnosticCategory;
pub use compiler::LanguageService;
pub use compiler::ServiceFile;
pub use compiler::ServiceSettings;
pub use directive::DirectiveCompiler;
pub use manager::DefaultProjectFactory;
pub use manager::ManagerError;
pub use manager::ManagerServices;
pub use manager::ProjectFactory;
pub use manager::ProjectManager;
pub use project::Project;
pub use project::ProjectContext;
pub use project::ProjectError;
pub use project::ProjectFileKind;
pub use project::ProjectState;
