//! Layered loading of `switchyard.json5`.
//!
//! Layers are read from fixed locations, checked against the key schema one
//! by one, merged in precedence order and decoded into `SwitchyardConfig`.
//! A requirements file can pin keys so later layers cannot change them.

mod layer_io;
mod merge;
mod schema;
mod utils;

#[cfg(test)]
mod tests;

pub use layer_io::user_config_dir;

use crate::{ConfigError, SwitchyardConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File name looked up in every local layer.
pub const DEFAULT_CONFIG_FILE: &str = "switchyard.json5";
/// Per-user and per-repo config directory.
pub const DEFAULT_CONFIG_DIR: &str = ".switchyard";
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git", DEFAULT_CONFIG_DIR];

#[cfg(not(windows))]
const SYSTEM_CONFIG_PATH: &str = "/etc/switchyard/switchyard.json5";
#[cfg(not(windows))]
const SYSTEM_REQUIREMENTS_PATH: &str = "/etc/switchyard/requirements.json5";
#[cfg(windows)]
const SYSTEM_CONFIG_PATH: &str = "C:\\ProgramData\\switchyard\\switchyard.json5";
#[cfg(windows)]
const SYSTEM_REQUIREMENTS_PATH: &str = "C:\\ProgramData\\switchyard\\requirements.json5";

/// Merged config and the layers that contributed to it.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: SwitchyardConfig,
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer was found. Ordered from lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// Pinned values; later layers cannot override keys set here.
    Requirements,
    System,
    User,
    Project,
    Cwd,
    Repo,
    Runtime,
}

impl ConfigLayerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigLayerSource::Requirements => "requirements",
            ConfigLayerSource::System => "system",
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Project => "project",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Repo => "repo",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// A layer that was read during loading.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Locations consulted by `SwitchyardConfig::load_layered_with_options`.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    pub system_config_path: Option<PathBuf>,
    pub user_config_path: Option<PathBuf>,
    pub requirements_path: Option<PathBuf>,
    /// Explicit files (for example from `--config`); these must exist.
    pub runtime_paths: Vec<PathBuf>,
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_system_config_path(),
            user_config_path: layer_io::default_user_config_path(),
            requirements_path: layer_io::default_requirements_path(),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Only look at the given working directory and explicit runtime files.
    pub fn isolated(cwd: impl AsRef<Path>) -> Self {
        Self {
            system_config_path: None,
            user_config_path: None,
            requirements_path: None,
            ..Self::new(cwd)
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl SwitchyardConfig {
    /// Load a single file with no layering.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config (path={})", path.display());
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Parse JSON5 contents with no layering.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("parsing config contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        decode_config(value, "config")
    }

    /// Load every default layer relative to `cwd`.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Precedence, low to high: system, user, project root, cwd, repo
    /// `.switchyard/`, runtime files. Requirements are applied first and lock
    /// every key they set.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        let mut layers = Vec::new();
        let mut pending = Vec::new();
        let mut seen = HashSet::new();

        let requirements = layer_io::read_optional(
            ConfigLayerSource::Requirements,
            options.requirements_path.as_deref(),
        )?;
        if let Some(layer) = &requirements {
            layers.push(layer.meta.clone());
        }

        for (source, path) in [
            (
                ConfigLayerSource::System,
                options.system_config_path.as_deref(),
            ),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
        ] {
            if let Some(layer) = layer_io::read_optional(source, path)?
                && seen.insert(utils::unique_path(&layer.meta.path))
            {
                layers.push(layer.meta.clone());
                pending.push(layer);
            }
        }

        let project_root = utils::find_project_root(&cwd, &options.project_root_markers);
        let mut local = Vec::new();
        if let Some(root) = &project_root {
            debug!("project root resolved (path={})", root.display());
            local.push((ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE)));
        }
        local.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE)));
        if let Some(root) = &project_root {
            local.push((
                ConfigLayerSource::Repo,
                root.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE),
            ));
        }

        for (source, path) in local {
            if !path.exists() {
                continue;
            }
            if !seen.insert(utils::unique_path(&path)) {
                debug!(
                    "skipping duplicate layer (source={}, path={})",
                    source.as_str(),
                    path.display()
                );
                continue;
            }
            let layer = layer_io::read_required(source, &path)?;
            layers.push(layer.meta.clone());
            pending.push(layer);
        }

        for path in &options.runtime_paths {
            let layer = layer_io::read_required(ConfigLayerSource::Runtime, path)?;
            layers.push(layer.meta.clone());
            pending.push(layer);
        }

        let locked = requirements.map(|layer| layer.value);
        let mut merged = Value::Object(serde_json::Map::new());
        if let Some(locked) = &locked {
            merge::overlay(&mut merged, locked);
        }
        for layer in pending {
            merge::overlay_unlocked(&mut merged, &layer.value, locked.as_ref());
        }

        let config = decode_config(merged, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Range checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.validator.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "validator.confidence_threshold must be within 0..=1 (got {threshold})"
            )));
        }
        if self.providers.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "providers.call_timeout_ms must be positive".to_string(),
            ));
        }
        if self.providers.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "providers.connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.planner.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "planner.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

fn decode_config(value: Value, label: &str) -> Result<SwitchyardConfig, ConfigError> {
    schema::check_layer(&value, label)?;
    let config: SwitchyardConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
