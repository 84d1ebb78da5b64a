use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::query::DEFAULT_MAX_NODES;

pub const DEFAULT_DATABASE: &str = "historian.db";
pub const DEFAULT_PORT: u16 = 8000;

/// Contents of `historian.toml`; every key is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct HistorianConfig {
    pub database: Option<String>,
    pub histories: Option<String>,
    pub max_graph_nodes: Option<usize>,
    pub port: Option<u16>,
}

impl HistorianConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(self.database.as_deref().unwrap_or(DEFAULT_DATABASE))
    }

    pub fn histories_path(&self) -> Option<PathBuf> {
        self.histories.as_deref().map(PathBuf::from)
    }

    pub fn max_graph_nodes(&self) -> usize {
        self.max_graph_nodes.unwrap_or(DEFAULT_MAX_NODES)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("historian.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<HistorianConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: HistorianConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &HistorianConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HistorianConfig::default();
        assert_eq!(config.database_path(), PathBuf::from("historian.db"));
        assert_eq!(config.histories_path(), None);
        assert_eq!(config.max_graph_nodes(), 50);
        assert_eq!(config.port(), 8000);
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("historian.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historian.toml");
        let config = HistorianConfig {
            database: Some("data/merged.db".into()),
            histories: Some("histories".into()),
            max_graph_nodes: Some(20),
            port: None,
        };

        write_config(&path, &config, false).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config.clone()));

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &HistorianConfig::default(), true).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), Some(HistorianConfig::default()));
    }

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historian.toml");
        std::fs::write(&path, "port = 9000\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.database_path(), PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn test_ensure_db_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("historian.db");
        ensure_db_dir(&db).unwrap();
        assert!(dir.path().join("nested").is_dir());
        ensure_db_dir(Path::new("historian.db")).unwrap();
    }
}
