//! Locating configuration files.
//!
//! A project keeps at most one `phc.{toml,yaml,yml,json}` next to where the
//! binary runs. When several exist they are all merged, TOML first.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};

/// Base name of discovered configuration files.
pub const CONFIG_FILE_STEM: &str = "phc";

/// Configuration file format detected from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Discovery order; later formats override earlier ones.
    pub const ALL: [ConfigFormat; 3] = [Self::Toml, Self::Yaml, Self::Json];

    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Toml => &["toml"],
            Self::Yaml => &["yaml", "yml"],
            Self::Json => &["json"],
        }
    }
}

/// A configuration file and its format.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub format: ConfigFormat,
}

impl ConfigFile {
    /// An explicitly named file, which must exist and carry a known extension.
    pub fn explicit(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound { path });
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let format = ConfigFormat::from_extension(ext).ok_or_else(|| {
            ConfigError::UnsupportedFormat {
                format: ext.to_string(),
            }
        })?;
        Ok(Self { path, format })
    }
}

/// Every `phc.*` file present in `dir`, in merge order.
pub fn discover(dir: &Path) -> Vec<ConfigFile> {
    debug!("Discovering configuration files in {}", dir.display());
    let mut files = Vec::new();
    for format in ConfigFormat::ALL {
        for ext in format.extensions() {
            let path = dir.join(format!("{CONFIG_FILE_STEM}.{ext}"));
            if path.is_file() {
                trace!("Found config file: {}", path.display());
                files.push(ConfigFile { path, format });
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("yml"), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("ini"), None);
    }

    #[test]
    fn discovers_in_merge_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("phc.json"), "{}").unwrap();
        fs::write(dir.path().join("phc.toml"), "").unwrap();
        fs::write(dir.path().join("other.toml"), "").unwrap();

        let formats: Vec<_> = discover(dir.path()).into_iter().map(|f| f.format).collect();
        assert_eq!(formats, [ConfigFormat::Toml, ConfigFormat::Json]);
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = ConfigFile::explicit(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn explicit_file_needs_known_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("phc.ini");
        fs::write(&path, "").unwrap();
        let err = ConfigFile::explicit(path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { format } if format == "ini"));
    }
}
