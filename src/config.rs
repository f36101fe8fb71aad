use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaybookConfig {
    pub database_name: String,
    pub version: u32,
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for DaybookConfig {
    fn default() -> Self {
        Self {
            database_name: "daybook".to_string(),
            version: 1,
            data_dir: PathBuf::from(".daybook"),
            export_dir: PathBuf::from("."),
        }
    }
}

impl DaybookConfig {
    /// SQLite file backing the object stores
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.database_name))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("daybook.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DaybookConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DaybookConfig = toml::from_str(&contents)?;
    if config.version == 0 {
        anyhow::bail!("{}: version must be a positive integer", path.display());
    }
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DaybookConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("daybook.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybook.toml");
        let config = DaybookConfig {
            database_name: "journal".into(),
            version: 4,
            ..DaybookConfig::default()
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybook.toml");
        std::fs::write(&path, "database_name = \"notes\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.database_path(), PathBuf::from(".daybook").join("notes.sqlite3"));
    }

    #[test]
    fn test_zero_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybook.toml");
        std::fs::write(&path, "version = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
