use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use flow_core::{
    filter::{SortDirection, SortField, TaskFilter, TaskSort},
    focus::DEFAULT_FOCUS_MINUTES,
};
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `<config dir>/whisperrflow/config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory.
    pub data_dir: Option<PathBuf>,
    /// Signed-in user; absent means guest.
    pub user_id: Option<String>,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub focus: FocusConfig,
}

/// Default list view.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ViewConfig {
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub show_completed: Option<bool>,
    pub show_archived: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FocusConfig {
    pub minutes: Option<u32>,
}

impl ViewConfig {
    pub fn sort(&self) -> Result<TaskSort> {
        let field = match &self.sort {
            Some(raw) => raw.parse::<SortField>()?,
            None => SortField::default(),
        };
        let direction = match &self.direction {
            Some(raw) => raw.parse::<SortDirection>()?,
            None => SortDirection::default(),
        };
        Ok(TaskSort::new(field, direction))
    }

    pub fn filter(&self) -> TaskFilter {
        let defaults = TaskFilter::default();
        TaskFilter {
            show_completed: self.show_completed.unwrap_or(defaults.show_completed),
            show_archived: self.show_archived.unwrap_or(defaults.show_archived),
            ..defaults
        }
    }
}

impl FocusConfig {
    pub fn minutes(&self) -> u32 {
        self.minutes.unwrap_or(DEFAULT_FOCUS_MINUTES)
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("whisperrflow").join("config.toml"))
}

/// Write the config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
