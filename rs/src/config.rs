//! Configuration for revstore

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the watermark file
    #[serde(rename = "revisions-file", default = "crate::default_revisions_path")]
    pub revisions_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            revisions_file: crate::default_revisions_path(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)
                .context(format!("Failed to read config from {}", config_path.display()))?;
            let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
            return Ok(config);
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("svnwatch").join("revstore.yml")),
            Some(PathBuf::from("revstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_path_ends_with_file_name() {
        let config = Config::default();
        assert!(config.revisions_file.ends_with(crate::DEFAULT_FILE_NAME));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("revstore.yml");
        std::fs::write(&path, "revisions-file: /srv/svnwatch/revs.json\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.revisions_file, PathBuf::from("/srv/svnwatch/revs.json"));
    }

    #[test]
    fn test_load_empty_mapping_uses_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("revstore.yml");
        std::fs::write(&path, "{}\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.revisions_file, crate::default_revisions_path());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nope.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
