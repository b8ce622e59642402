use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::CliError;

pub const DEFAULT_SETTINGS_PATH: &str = "checksync.toml";

/// Optional `checksync.toml`; command-line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Schemas to introspect when no `--schema` flag is given.
    #[serde(default)]
    pub schemas: Vec<String>,
    /// Run registry directory when `--run-dir` is not given.
    #[serde(default)]
    pub run_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_toml_str(source: &str) -> Result<Self, CliError> {
        Ok(toml::from_str(source)?)
    }

    /// Load settings from `path`. A missing file at the default location
    /// yields the defaults; an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_SETTINGS_PATH), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|err| {
            CliError::InvalidConfig(format!("reading settings {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// `--schema` flags win over configured schemas.
    pub fn schemas(&self, flags: &[String]) -> Vec<String> {
        if flags.is_empty() {
            self.schemas.clone()
        } else {
            flags.to_vec()
        }
    }

    pub fn run_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.run_dir.clone())
            .unwrap_or_else(|| PathBuf::from("runs"))
    }
}
