mod preferences;
mod project;

use std::collections::BTreeMap;

use camino::Utf8Path;
use config::Config;
use config::ConfigError as ExternalConfigError;
use config::File;
use config::FileFormat;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

pub use crate::preferences::FilePreferences;
pub use crate::preferences::PreferenceSource;
pub use crate::preferences::StaticPreferences;
pub use crate::project::CompilerFlags;
pub use crate::project::LanguageLevel;
pub use crate::project::ModuleKind;
pub use crate::project::ModuleResolution;
pub use crate::project::ProjectConfig;
pub use crate::project::ProjectId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration build/deserialize error")]
    Config(#[from] ExternalConfigError),
    #[error("Project '{id}' has an invalid configuration")]
    Project {
        id: ProjectId,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("Failed to deserialize project table")]
    Table(#[from] serde_json::Error),
    #[error("Project lists no sources")]
    NoSources,
    #[error("Invalid pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    debug: bool,
    projects: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    debug: bool,
    projects: BTreeMap<ProjectId, ProjectConfig>,
}

impl Settings {
    pub fn new(project_root: &Utf8Path) -> Result<Self, ConfigError> {
        let user_config_file = ProjectDirs::from("dev", "tsls", "tsls")
            .map(|proj_dirs| proj_dirs.config_dir().join("tsls.toml"));

        Self::load_from_paths(project_root, user_config_file.as_deref())
    }

    pub(crate) fn load_from_paths(
        project_root: &Utf8Path,
        user_config_path: Option<&std::path::Path>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = user_config_path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            File::from(project_root.join(".tsls.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        builder = builder.add_source(
            File::from(project_root.join("tsls.toml").as_std_path())
                .format(FileFormat::Toml)
                .required(false),
        );

        let raw: RawSettings = builder.build()?.try_deserialize()?;

        let mut projects = BTreeMap::new();
        for (id, table) in raw.projects {
            let id = ProjectId::from(id);
            match parse_project(table) {
                Ok(config) => {
                    projects.insert(id, config);
                }
                Err(err) => {
                    let err = ConfigError::Project {
                        id: id.clone(),
                        source: Box::new(err),
                    };
                    tracing::warn!("Skipping project '{}': {:?}", id, err);
                }
            }
        }

        Ok(Self {
            debug: raw.debug,
            projects,
        })
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn projects(&self) -> &BTreeMap<ProjectId, ProjectConfig> {
        &self.projects
    }
}

fn parse_project(table: serde_json::Value) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = serde_json::from_value(table)?;
    config.validate()?;
    Ok(config)
}
