//! User configuration for the `markform` command line tool.
//!
//! ```toml
//! forms_path = "~/forms"
//! dialect = "comments"   # keep | tags | comments
//! roles = ["user"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Role names a form field can carry.
pub const KNOWN_ROLES: [&str; 2] = ["agent", "user"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Unknown role `{role}` in config file at {config_path}")]
    UnknownRole { config_path: PathBuf, role: String },
}

/// Directive syntax used when the CLI rewrites a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectPreference {
    /// Whatever the document already uses.
    #[default]
    Keep,
    Tags,
    Comments,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory scanned by `markform list`.
    pub forms_path: PathBuf,
    #[serde(default)]
    pub dialect: DialectPreference,
    /// Roles `issues` reports on when none are given; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl Config {
    pub fn new(forms_path: impl Into<PathBuf>) -> Self {
        Self {
            forms_path: forms_path.into(),
            dialect: DialectPreference::default(),
            roles: Vec::new(),
        }
    }

    /// `Ok(None)` when there is no file at `config_path`.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;
        Self::from_toml(&content, config_path).map(Some)
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    /// Parses config text; `config_path` is only used in errors.
    fn from_toml(content: &str, config_path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        if let Some(role) = config
            .roles
            .iter()
            .find(|r| !KNOWN_ROLES.contains(&r.as_str()))
        {
            return Err(ConfigError::UnknownRole {
                config_path: config_path.to_path_buf(),
                role: role.clone(),
            });
        }

        // `~` and `$VAR` in forms_path; left as written if expansion fails
        if let Ok(expanded) = shellexpand::full(&config.forms_path.to_string_lossy()) {
            config.forms_path = PathBuf::from(expanded.as_ref());
        }
        Ok(config)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    /// `~/.config/markform/config.toml`
    pub fn config_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.config/markform").as_ref()).join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::from_toml(content, Path::new("config.toml"))
    }

    #[test]
    fn test_config_path_is_under_markform() {
        let config_path = Config::config_path();
        assert!(!config_path.to_string_lossy().starts_with('~'));
        assert!(config_path.ends_with(".config/markform/config.toml"));
    }

    #[test]
    fn test_dialect_and_roles_default() {
        let config = parse(r#"forms_path = "/srv/forms""#).unwrap();
        assert_eq!(config, Config::new("/srv/forms"));
    }

    #[test]
    fn test_dialect_and_roles_are_read() {
        let config = parse(
            r#"
forms_path = "/srv/forms"
dialect = "comments"
roles = ["user"]
"#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectPreference::Comments);
        assert_eq!(config.roles, vec!["user".to_string()]);
    }

    #[test]
    fn test_unknown_dialect_is_a_parse_error() {
        let result = parse("forms_path = \"/f\"\ndialect = \"html\"\n");
        assert!(matches!(result, Err(ConfigError::ConfigParseError { .. })));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let result = parse("forms_path = \"/f\"\nroles = [\"user\", \"robot\"]\n");
        assert!(matches!(
            result,
            Err(ConfigError::UnknownRole { ref role, .. }) if role == "robot"
        ));
    }

    #[test]
    fn test_forms_path_expands_env_vars() {
        unsafe {
            env::set_var("MARKFORM_FORMS_ROOT", "/custom/forms");
        }
        let config = parse("forms_path = \"$MARKFORM_FORMS_ROOT/team\"\n").unwrap();
        assert_eq!(config.forms_path, PathBuf::from("/custom/forms/team"));
        unsafe {
            env::remove_var("MARKFORM_FORMS_ROOT");
        }
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from_path(temp_dir.path().join("nonexistent.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::new("/tmp/test-forms");
        config.dialect = DialectPreference::Tags;
        config.roles = vec!["agent".to_string()];

        config.save_to_path(&config_file).unwrap();

        assert_eq!(Config::load_from_path(&config_file).unwrap(), Some(config));
    }
}
