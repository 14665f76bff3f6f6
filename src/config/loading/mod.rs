mod merging;

use std::{
    fs,
    path::{Path, PathBuf},
};

use merging::merge_toml_layers;
use toml::Value;
use tracing::{debug, instrument};

use super::{Config, ConfigData, ConfigError, ConfigPaths};

impl Config {
    /// Loads the main configuration file merged with its `conf.d/` drop-ins.
    ///
    /// A missing main file yields the defaults. Drop-in files (`*.toml`) are
    /// applied in lexical order, each overriding what came before.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A configuration file cannot be read
    /// - The TOML content is invalid
    /// - The merged configuration does not match the schema
    pub fn load(path: &Path) -> Result<(Config, Vec<PathBuf>), ConfigError> {
        let files = Self::config_files(path)?;

        let layers = files
            .iter()
            .map(|file| Self::load_toml_file(file))
            .collect::<Result<Vec<_>, _>>()?;

        let merged = merge_toml_layers(layers);
        let config: Config =
            merged
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::ConfigValidation {
                    component: "config parsing".to_string(),
                    details: e.to_string(),
                })?;

        Ok((config, files))
    }

    /// Lists every file that contributes to the configuration rooted at `path`.
    ///
    /// # Errors
    /// Returns an error if the drop-in directory exists but cannot be listed.
    pub fn config_files(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let mut files = Vec::new();
        if path.exists() {
            files.push(path.to_path_buf());
        }

        let drop_in_dir = ConfigPaths::drop_in_dir(path);
        if drop_in_dir.is_dir() {
            let mut drop_ins = fs::read_dir(&drop_in_dir)
                .map_err(|e| ConfigError::io(e, &drop_in_dir))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect::<Vec<_>>();
            drop_ins.sort();
            files.extend(drop_ins);
        }

        Ok(files)
    }

    fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(e, path))?;
        debug!(path = %path.display(), "Loaded configuration file");
        toml::from_str(&content).map_err(|e| ConfigError::toml_parse(e, Some(path)))
    }
}

impl ConfigData {
    /// Loads a snapshot from the configuration rooted at `path`.
    ///
    /// # Errors
    /// Propagates loading and match-spec parse errors.
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let (config, files) = Config::load(path)?;
        ConfigData::new(config, files)
    }
}
