use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::collectors::Item;
use crate::config::default_configs::Preset;
use crate::config::env_vars::expand_env_vars;

/// An item list as stored in YAML.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ItemsConfig {
    pub version: String,
    pub description: String,
    pub items: Vec<Item>,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Preset::for_current_os().config()
    }
}

impl ItemsConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: ItemsConfig = serde_yaml::from_str(&content)
            .context(format!("Failed to parse YAML config {}", path.display()))?;

        debug!("Loaded {} items from {}", config.items.len(), path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Expand %VAR%, $VAR and ${VAR} in paths and command lines
    pub fn process_environment_variables(&mut self) {
        for item in &mut self.items {
            item.map_paths(expand_env_vars);
        }
    }
}

/// Item list for a run: the file at `config_path` if given, otherwise the
/// preset (defaulting to the running OS). Environment references are
/// expanded either way.
pub fn load_items_config(config_path: Option<&Path>, preset: Option<Preset>) -> Result<ItemsConfig> {
    let mut config = match config_path {
        Some(path) => ItemsConfig::from_yaml_file(path)?,
        None => {
            let preset = preset.unwrap_or_else(Preset::for_current_os);
            info!("No config path provided, using the {:?} preset", preset);
            preset.config()
        }
    };
    config.process_environment_variables();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    use crate::collectors::Command;

    fn create_test_config() -> ItemsConfig {
        ItemsConfig {
            version: "1.0".to_string(),
            description: "Test configuration".to_string(),
            items: vec![
                Item::directory("/var/log", "messages"),
                Item::Command(Command::new("uname", &["-a"]).env("LC_ALL", "C")),
                Item::Hostname,
            ],
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.yaml");

        let config = create_test_config();
        config.save_to_yaml_file(&path).unwrap();
        let loaded = ItemsConfig::from_yaml_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_yaml_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = ItemsConfig::from_yaml_file(&temp_dir.path().join("missing.yaml"));
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to read config file"));
    }

    #[test]
    fn test_from_yaml_file_invalid_item_type() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        fs::write(
            &path,
            "version: '1.0'\ndescription: bad\nitems:\n  - type: registry\n    key: HKLM\n",
        )
        .unwrap();
        assert!(ItemsConfig::from_yaml_file(&path).is_err());
    }

    #[test]
    fn test_process_environment_variables() {
        env::set_var("LC_TEST_CFG_ROOT", "/srv/app");
        let mut config = ItemsConfig {
            version: "1.0".to_string(),
            description: "env".to_string(),
            items: vec![
                Item::directory("$LC_TEST_CFG_ROOT/logs", "app.*log$"),
                Item::command("${LC_TEST_CFG_ROOT}/bin/status", &["--root", "%LC_TEST_CFG_ROOT%"]),
            ],
        };
        config.process_environment_variables();
        env::remove_var("LC_TEST_CFG_ROOT");

        assert_eq!(config.items[0], Item::directory("/srv/app/logs", "app.*log$"));
        assert_eq!(config.items[1], Item::command("/srv/app/bin/status", &["--root", "/srv/app"]));
    }

    #[test]
    fn test_load_items_config_prefers_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.yaml");
        create_test_config().save_to_yaml_file(&path).unwrap();

        let loaded = load_items_config(Some(&path), Some(Preset::Windows)).unwrap();
        assert_eq!(loaded.items.len(), 3);
        assert_eq!(loaded.description, "Test configuration");
    }

    #[test]
    fn test_load_items_config_preset() {
        let loaded = load_items_config(None, Some(Preset::Generic)).unwrap();
        assert_eq!(loaded.items, vec![Item::Environment, Item::Hostname]);
    }
}
