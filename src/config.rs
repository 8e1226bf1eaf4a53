//! Daemon configuration
//!
//! Loads the settings the daemon publishes from a TOML file at
//! `~/.config/xsettings/config.toml`. A missing file is not an error: the
//! daemon then manages an empty snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::setting::{Color, SettingValue};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings to publish, keyed by protocol name (e.g. `Net/ThemeName`).
    #[serde(default)]
    pub settings: BTreeMap<String, ConfigValue>,
}

/// One configured value: a bare integer, a bare string, or an inline
/// color table `{ red = .., green = .., blue = .., alpha = .. }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i32),
    Text(String),
    Color {
        red: u16,
        green: u16,
        blue: u16,
        alpha: u16,
    },
}

impl From<&ConfigValue> for SettingValue {
    fn from(v: &ConfigValue) -> Self {
        match v {
            ConfigValue::Int(i) => SettingValue::Int(*i),
            ConfigValue::Text(s) => SettingValue::Text(s.clone()),
            ConfigValue::Color {
                red,
                green,
                blue,
                alpha,
            } => SettingValue::Color(Color::new(*red, *green, *blue, *alpha)),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// no path is given. A missing file yields the empty default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            info!("Config file not found at {:?}, publishing no settings", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("xsettings");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_all_value_kinds() {
        let toml_str = r#"
            [settings]
            "Net/DoubleClickTime" = 400
            "Net/ThemeName" = "Adwaita"
            "Test/Background" = { red = 65535, green = 32768, blue = 0, alpha = 65535 }
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.settings.len(), 3);

        assert_eq!(
            SettingValue::from(&config.settings["Net/DoubleClickTime"]),
            SettingValue::Int(400)
        );
        assert_eq!(
            SettingValue::from(&config.settings["Net/ThemeName"]),
            SettingValue::Text("Adwaita".into())
        );
        assert_eq!(
            SettingValue::from(&config.settings["Test/Background"]),
            SettingValue::Color(Color::new(65535, 32768, 0, 65535))
        );
    }

    #[test]
    fn config_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.settings.is_empty());
    }

    #[test]
    fn config_serialize_roundtrip() {
        let toml_str = r#"
            [settings]
            "Net/ThemeName" = "Adwaita"
            "Xft/DPI" = 98304
        "#;
        let original: Config = toml::from_str(toml_str).unwrap();

        let serialized = toml::to_string(&original).unwrap();
        let reparsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(format!("{original:?}"), format!("{reparsed:?}"));
    }

    #[test]
    fn negative_integers_are_preserved() {
        let config: Config = toml::from_str(
            r#"
            [settings]
            "Gtk/RecentFilesMaxAge" = -1
        "#,
        )
        .unwrap();
        assert_eq!(
            SettingValue::from(&config.settings["Gtk/RecentFilesMaxAge"]),
            SettingValue::Int(-1)
        );
    }
}
