use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

pub mod env;

pub use env::Declarations;

pub const DEFAULT_SETTINGS_FILE: &str = "config.json";

fn default_configs() -> String {
    "configs".into()
}

fn default_recipes() -> String {
    "recipes".into()
}

fn default_cache() -> String {
    "cache".into()
}

fn default_logs() -> String {
    "logs".into()
}

fn default_installer() -> String {
    "apt-get install -y".into()
}

fn default_user() -> String {
    "root".into()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

/// Global settings, read from `config.json` in the working directory.
///
/// Every field is optional; a missing file yields [`Settings::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(default = "default_configs")]
    pub configs: String,
    #[serde(default = "default_recipes")]
    pub recipes: String,
    #[serde(default = "default_cache")]
    pub cache: String,
    #[serde(default = "default_logs")]
    pub logs: String,
    // Used for virtual recipes (names with no directory under `recipes`).
    #[serde(default = "default_installer")]
    pub installer: String,
    #[serde(deserialize_with = "de_flag")]
    pub force: bool,
    #[serde(default = "default_user")]
    pub user: String,
    pub password: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            configs: default_configs(),
            recipes: default_recipes(),
            cache: default_cache(),
            logs: default_logs(),
            installer: default_installer(),
            force: false,
            user: default_user(),
            password: None,
            port: default_port(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Settings {
    pub fn configs_dir(&self) -> PathBuf {
        PathBuf::from(&self.configs)
    }

    pub fn recipes_dir(&self) -> PathBuf {
        PathBuf::from(&self.recipes)
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(&self.cache)
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.logs)
    }

    pub fn config_path(&self, config_name: &str) -> PathBuf {
        self.configs_dir().join(config_name)
    }

    /// Names of the deployable configurations (files under `configs`), sorted.
    pub fn available_configs(&self) -> Result<Vec<String>> {
        let dir = self.configs_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::io(format!("failed to list {}: {e}", dir.display())))?;
            if entry.file_type().is_file() {
                out.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(out)
    }
}

/// Accepts JSON booleans and the yes/no strings older config files used.
fn de_flag<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }
    match Flag::deserialize(de)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => str2bool(&s).map_err(serde::de::Error::custom),
    }
}

/// Parse the yes/no spellings accepted for `force`.
pub fn str2bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        other => Err(Error::config(format!("invalid boolean value: '{other}'"))),
    }
}

pub fn load(path: &Path) -> Result<Settings> {
    if !path.is_file() {
        return Ok(Settings::default());
    }
    let data = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("failed to read settings {}: {e}", path.display())))?;
    serde_json::from_str(&data)
        .map_err(|e| Error::config(format!("JSON parse error in {}: {e}", path.display())))
}
