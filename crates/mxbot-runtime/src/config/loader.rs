//! Layered configuration loading on figment.
//!
//! Sources, later ones winning:
//!
//! 1. [`MxbotConfig::default`], then any values passed to [`ConfigLoader::merge`]
//! 2. the first config file found (or the one given to [`ConfigLoader::file`])
//! 3. its profile overlay, e.g. `mxbot.prod.toml` next to `mxbot.toml`
//! 4. `MXBOT_*` environment variables, `__` separating nested keys
//!    (`MXBOT_MATRIX__ACCESS_TOKEN=syt_...`)
//!
//! TOML files need the `toml-config` feature (on by default), YAML files the
//! `yaml-config` feature.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .file("deploy/mxbot.toml")
//!     .profile("prod")
//!     .load_validated()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::MxbotConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "MXBOT_";

/// Names the profile overlay when no profile is set explicitly.
const PROFILE_VAR: &str = "MXBOT_PROFILE";

/// Looked up in every search directory, in this order.
const FILE_NAMES: &[&str] = &[
    "mxbot.toml",
    "config.toml",
    "mxbot.yaml",
    "mxbot.yml",
    "config.yaml",
    "config.yml",
];

/// Builds an [`MxbotConfig`] from files, the environment and overrides.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
    profile: Option<String>,
    env: bool,
    overrides: Vec<MxbotConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            search_paths: Vec::new(),
            profile: std::env::var(PROFILE_VAR).ok().filter(|p| !p.is_empty()),
            env: true,
            overrides: Vec::new(),
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Searches `dir` for a config file. Without any search path the loader
    /// looks in the working directory and then the user config directory.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_paths.push(dir.as_ref().to_path_buf());
        self
    }

    /// Overlays `<stem>.<profile>.<ext>` on top of the chosen file.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Ignores `MXBOT_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Replaces the built-in defaults with `config`; files and the
    /// environment still override it.
    pub fn merge(mut self, config: MxbotConfig) -> Self {
        self.overrides.push(config);
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<MxbotConfig> {
        let mut figment = Figment::from(Serialized::defaults(MxbotConfig::default()));
        for config in &self.overrides {
            figment = figment.merge(Serialized::defaults(config));
        }

        match self.config_file()? {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                figment = merge_file(figment, &path)?;
                if let Some(overlay) = self.profile_overlay(&path) {
                    debug!(path = %overlay.display(), "Loading profile overlay");
                    figment = merge_file(figment, &overlay)?;
                }
            }
            None => warn!("No configuration file found, using defaults"),
        }

        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let config: MxbotConfig = figment.extract()?;
        debug!(
            homeserver = %config.matrix.homeserver,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads the configuration and rejects it unless it can start a backend.
    pub fn load_validated(self) -> ConfigResult<MxbotConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn config_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            return Ok(Some(path.clone()));
        }

        let dirs = if self.search_paths.is_empty() {
            default_search_paths()
        } else {
            self.search_paths.clone()
        };
        Ok(dirs
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| format_enabled(path) && path.exists()))
    }

    fn profile_overlay(&self, path: &Path) -> Option<PathBuf> {
        let profile = self.profile.as_deref()?;
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        let overlay = path.with_file_name(format!("{stem}.{profile}.{ext}"));
        overlay.exists().then_some(overlay)
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join("mxbot")))
        .collect()
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

fn format_enabled(path: &Path) -> bool {
    match extension(path) {
        "toml" => cfg!(feature = "toml-config"),
        "yaml" | "yml" => cfg!(feature = "yaml-config"),
        _ => false,
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match extension(path) {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        ext => Err(ConfigError::ParseError(format!(
            "unsupported or disabled configuration format: .{ext}"
        ))),
    }
}

/// Loads and validates the configuration from the default locations.
pub fn load_config() -> ConfigResult<MxbotConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates the configuration from one file plus the environment.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<MxbotConfig> {
    ConfigLoader::new().file(path).load_validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mxbot-config-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn empty_search_path_gives_defaults() {
        let config = ConfigLoader::new()
            .search_path(temp_dir("empty"))
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert!(config.matrix.homeserver.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = ConfigLoader::new()
            .file("/nonexistent/mxbot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn toml_file_is_loaded() {
        let dir = temp_dir("toml");
        let path = dir.join("mxbot.toml");
        std::fs::write(
            &path,
            "[matrix]\nhomeserver = \"matrix.example.org\"\naccess_token = \"syt\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .file(&path)
            .without_env()
            .load_validated()
            .unwrap();
        assert_eq!(config.matrix.homeserver_url(), "https://matrix.example.org");
        assert_eq!(config.logging.level, LogLevel::Debug);
        std::fs::remove_dir_all(dir).ok();
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn profile_overlay_wins_over_its_base_file() {
        let dir = temp_dir("profile");
        std::fs::write(
            dir.join("mxbot.toml"),
            "[matrix]\ndevice_name = \"base\"\nsync_timeout_ms = 1000\n",
        )
        .unwrap();
        std::fs::write(dir.join("mxbot.prod.toml"), "[matrix]\ndevice_name = \"prod\"\n").unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.matrix.device_name, "prod");
        assert_eq!(config.matrix.sync_timeout_ms, 1000);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = temp_dir("ini");
        let path = dir.join("mxbot.ini");
        std::fs::write(&path, "").unwrap();
        let result = ConfigLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn merged_values_still_get_validated() {
        let mut overrides = MxbotConfig::default();
        overrides.matrix.homeserver = "matrix.example.org".into();

        let result = ConfigLoader::new()
            .search_path(temp_dir("merge"))
            .without_env()
            .merge(overrides)
            .load_validated();
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }
}
