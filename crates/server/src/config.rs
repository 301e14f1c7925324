use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::ScanMode;
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_INDEX_PATH: &str = "library.redb";
const DEFAULT_COVERS_PATH: &str = "covers";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub music_root: String,
    pub index_path: String,
    pub covers_path: String,
    pub port: u16,
    pub default_scan_mode: ScanMode,
    pub scan_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: "".to_string(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            covers_path: DEFAULT_COVERS_PATH.to_string(),
            port: DEFAULT_PORT,
            default_scan_mode: ScanMode::Fast,
            scan_on_start: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("SONGBOOK_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Loads the config, writing defaults first when the file is absent.
/// The flag is true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.index_path.trim().is_empty() {
            config.index_path = DEFAULT_INDEX_PATH.to_string();
        }
        if config.covers_path.trim().is_empty() {
            config.covers_path = DEFAULT_COVERS_PATH.to_string();
        }
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

/// Relative values resolve against the directory holding the config file.
pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_music_root(config_path: &Path, value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_default_config_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/config.yaml");

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config, ServerConfig::default());
        assert!(path.exists());

        let (reloaded, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(reloaded, config);
    }

    #[test]
    fn fills_blank_fields_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "music_root: /srv/music\nindex_path: ''\nport: 0\ndefault_scan_mode: incremental\n",
        )
        .unwrap();

        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.music_root, "/srv/music");
        assert_eq!(config.index_path, DEFAULT_INDEX_PATH);
        assert_eq!(config.covers_path, DEFAULT_COVERS_PATH);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.default_scan_mode, ScanMode::Incremental);
        assert!(!config.scan_on_start);
    }

    #[test]
    fn rejects_unknown_scan_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "default_scan_mode: turbo\n").unwrap();
        assert!(matches!(
            load_or_create_config(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn resolves_relative_paths_against_config_dir() {
        let config_path = Path::new("/etc/songbook/config.yaml");
        assert_eq!(
            resolve_path(config_path, "library.redb"),
            PathBuf::from("/etc/songbook/library.redb")
        );
        assert_eq!(
            resolve_path(config_path, "/var/lib/covers"),
            PathBuf::from("/var/lib/covers")
        );
        assert_eq!(
            resolve_path(Path::new("config.yaml"), "covers"),
            PathBuf::from("./covers")
        );
    }

    #[test]
    fn blank_music_root_is_unconfigured() {
        let config_path = Path::new("/etc/songbook/config.yaml");
        assert_eq!(resolve_music_root(config_path, "   "), None);
        assert_eq!(
            resolve_music_root(config_path, " music "),
            Some(PathBuf::from("/etc/songbook/music"))
        );
    }
}
