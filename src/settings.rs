// App-level settings - defaults, optional settings.json, command-line overrides
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "catalog.db";
const OUTPUT_DIR: &str = "generated_images";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Directory holding the catalog and, by default, generated images
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Root under which screenshots and contact sheets are written
    pub output_dir: PathBuf,
    /// `tracing` filter used when RUST_LOG is not set
    pub log_filter: String,
    /// How long watch mode waits for events to settle before rescanning
    pub watch_debounce_ms: u64,
}

/// One layer of partially specified settings (file or command line)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsLayer {
    pub data_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub watch_debounce_ms: Option<u64>,
}

impl SettingsLayer {
    /// Values set here win over values set in `lower`
    fn over(self, lower: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            data_dir: self.data_dir.or(lower.data_dir),
            database_path: self.database_path.or(lower.database_path),
            output_dir: self.output_dir.or(lower.output_dir),
            log_filter: self.log_filter.or(lower.log_filter),
            watch_debounce_ms: self.watch_debounce_ms.or(lower.watch_debounce_ms),
        }
    }
}

impl Settings {
    /// Load settings: command line over settings.json over defaults
    pub fn load(cli: SettingsLayer) -> Result<Self> {
        let file = match Self::get_settings_path() {
            Some(path) if path.exists() => read_layer(&path)?,
            _ => SettingsLayer::default(),
        };
        Ok(Self::resolve(cli.over(file), Self::default_data_dir()))
    }

    /// Fill unset values; database and output default to paths inside the data dir
    pub fn resolve(layer: SettingsLayer, default_data_dir: PathBuf) -> Self {
        let data_dir = layer.data_dir.unwrap_or(default_data_dir);
        Self {
            database_path: layer.database_path.unwrap_or_else(|| data_dir.join(DATABASE_FILE)),
            output_dir: layer.output_dir.unwrap_or_else(|| data_dir.join(OUTPUT_DIR)),
            log_filter: layer.log_filter.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            watch_debounce_ms: layer.watch_debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            data_dir,
        }
    }

    /// Create the data and output directories if needed
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Get the path to the optional settings file
    fn get_settings_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    fn default_data_dir() -> PathBuf {
        if let Some(proj_dirs) = Self::project_dirs() {
            proj_dirs.data_dir().to_path_buf()
        } else {
            // Fallback to home directory
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".video-contact-indexer")
        }
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "videoteam", "VideoContactIndexer")
    }
}

fn read_layer(path: &Path) -> Result<SettingsLayer> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|source| IndexError::Settings {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data_dir() {
        let settings = Settings::resolve(SettingsLayer::default(), PathBuf::from("/var/vci"));
        assert_eq!(settings.data_dir, PathBuf::from("/var/vci"));
        assert_eq!(settings.database_path, PathBuf::from("/var/vci/catalog.db"));
        assert_eq!(settings.output_dir, PathBuf::from("/var/vci/generated_images"));
        assert_eq!(settings.log_filter, "info");
        assert_eq!(settings.watch_debounce_ms, 2000);
    }

    #[test]
    fn data_dir_override_moves_derived_paths() {
        let cli = SettingsLayer {
            data_dir: Some(PathBuf::from("/srv/index")),
            ..Default::default()
        };
        let settings = Settings::resolve(cli, PathBuf::from("/var/vci"));
        assert_eq!(settings.database_path, PathBuf::from("/srv/index/catalog.db"));
        assert_eq!(settings.output_dir, PathBuf::from("/srv/index/generated_images"));
    }

    #[test]
    fn command_line_wins_over_file() {
        let file: SettingsLayer = serde_json::from_str(
            r#"{ "output_dir": "/from/file", "log_filter": "debug", "watch_debounce_ms": 500 }"#,
        )
        .unwrap();
        let cli = SettingsLayer {
            output_dir: Some(PathBuf::from("/from/cli")),
            ..Default::default()
        };

        let settings = Settings::resolve(cli.over(file), PathBuf::from("/var/vci"));
        assert_eq!(settings.output_dir, PathBuf::from("/from/cli"));
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.watch_debounce_ms, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        std::fs::write(&path, r#"{ "outptu_dir": "/typo" }"#).unwrap();

        assert!(matches!(read_layer(&path), Err(IndexError::Settings { .. })));
    }

    #[test]
    fn ensure_dirs_creates_output_root() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::resolve(SettingsLayer::default(), tmp.path().join("data"));

        settings.ensure_dirs().unwrap();
        assert!(settings.output_dir.is_dir());
        assert!(settings.data_dir.is_dir());
    }
}
