//! Configuration provider using Figment

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use tracing::{debug, info, trace};

use crate::discovery::{discover, ConfigFile, ConfigFormat};
use crate::error::ConfigResult;
use crate::types::PhcConfig;

/// Prefix of environment overrides, e.g. `PHC_DATABASE__PATH`.
pub const ENV_PREFIX: &str = "PHC_";

/// Loads [`PhcConfig`] from all sources.
///
/// Sources are merged in precedence order (later sources override earlier ones):
/// 1. Default values
/// 2. The explicit file, or `phc.*` files discovered in the search directory
/// 3. `PHC_` environment variables, with `__` separating nested keys
///
/// Nothing is cached; every `load` reads the sources again.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvider {
    explicit_file: Option<PathBuf>,
    search_dir: Option<PathBuf>,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use exactly this file instead of discovery.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Discover files in `dir` instead of the working directory.
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    /// Merge, extract and validate.
    pub fn load(&self) -> ConfigResult<PhcConfig> {
        let config: PhcConfig = self.build_figment()?.extract()?;
        config.validate()?;
        info!(
            database = %config.database.path.display(),
            actor = %config.actor,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn build_figment(&self) -> ConfigResult<Figment> {
        debug!("Building figment configuration with precedence order");
        Ok(Figment::new()
            .merge(Serialized::defaults(PhcConfig::default()))
            .merge(self.load_config_files()?)
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn load_config_files(&self) -> ConfigResult<Figment> {
        let files = match &self.explicit_file {
            Some(path) => vec![ConfigFile::explicit(path)?],
            None => {
                let dir = self
                    .search_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                discover(&dir)
            }
        };

        let mut figment = Figment::new();
        for file in files {
            trace!(
                "Loading config file: {} ({:?})",
                file.path.display(),
                file.format
            );
            figment = figment.merge(load_file(&file.path, file.format));
        }
        Ok(figment)
    }
}

fn load_file(path: &Path, format: ConfigFormat) -> Figment {
    match format {
        ConfigFormat::Toml => Figment::from(Toml::file(path)),
        ConfigFormat::Yaml => Figment::from(Yaml::file(path)),
        ConfigFormat::Json => Figment::from(Json::file(path)),
    }
}

/// Load from the working directory and the environment.
pub fn load_configuration() -> ConfigResult<PhcConfig> {
    ConfigProvider::new().load()
}
