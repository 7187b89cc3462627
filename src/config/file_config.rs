use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub upload_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub max_upload_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_dir = \"/data/db\"\nport = 4000\nlogging_level = \"headers\"\n",
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();

        assert_eq!(config.db_dir, Some("/data/db".to_string()));
        assert_eq!(config.port, Some(4000));
        assert_eq!(config.logging_level, Some("headers".to_string()));
        assert!(config.upload_dir.is_none());
        assert!(config.max_upload_bytes.is_none());
    }

    #[test]
    fn reports_unreadable_and_invalid_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(FileConfig::load(&missing)
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));

        let invalid = dir.path().join("invalid.toml");
        std::fs::write(&invalid, "port = \"not a number\"").unwrap();
        assert!(FileConfig::load(&invalid)
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }
}
