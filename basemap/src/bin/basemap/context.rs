use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = ".basemap";
pub const STORE_DIR_ENV: &str = "BASEMAP_STORE_DIR";

/// Project context for basemap operations
pub struct ProjectContext {
    /// Directory holding `.basemap/`, or the working directory when uninitialised
    pub project_root: PathBuf,
    /// Path to .basemap directory
    pub basemap_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: Option<BasemapConfig>,
}

/// Configuration stored in .basemap/config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasemapConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_dir")]
    pub dir: String,
    #[serde(default = "default_keep_versions")]
    pub keep_versions: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            keep_versions: default_keep_versions(),
        }
    }
}

fn default_store_dir() -> String {
    ".basemap/store".to_string()
}

fn default_keep_versions() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "docs".to_string()
}

impl ProjectContext {
    /// Find and load project context from current directory or ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    /// Find project context starting from the given directory
    pub fn find_from(start: &Path) -> Result<Self> {
        let project_root = Self::find_project_root(start).unwrap_or_else(|| start.to_path_buf());
        Self::from_root(project_root)
    }

    /// Create context from a known project root
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let basemap_dir = project_root.join(CONFIG_DIR);
        let config_path = basemap_dir.join("config.toml");

        let config = if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config.toml")?;
            let config: BasemapConfig =
                toml::from_str(&content).context("Failed to parse config.toml")?;
            Some(config)
        } else {
            None
        };

        Ok(Self {
            project_root,
            basemap_dir,
            config_path,
            config,
        })
    }

    /// Nearest ancestor holding a `.basemap` directory
    fn find_project_root(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(CONFIG_DIR).is_dir() {
                return Some(current);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Check if basemap is initialized in this project
    pub fn is_initialized(&self) -> bool {
        self.basemap_dir.exists() && self.config_path.exists()
    }

    fn settings(&self) -> BasemapConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Store directory: `BASEMAP_STORE_DIR`, else the configured one
    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(STORE_DIR_ENV)
            && !dir.trim().is_empty()
        {
            return Ok(PathBuf::from(dir));
        }
        let dir = expand_env(&self.settings().store.dir)?;
        Ok(self.project_root.join(dir))
    }

    pub fn keep_versions(&self) -> usize {
        self.settings().store.keep_versions
    }

    /// Directory that `doc` and `sync` write into
    pub fn output_dir(&self) -> Result<PathBuf> {
        let dir = expand_env(&self.settings().output.dir)?;
        Ok(self.project_root.join(dir))
    }
}

/// Expand a whole-value `${VAR}` reference from the environment
pub fn expand_env(value: &str) -> Result<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).with_context(|| format!("Environment variable {var_name} not set"))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BasemapConfig::default();
        assert_eq!(config.store.dir, ".basemap/store");
        assert_eq!(config.store.keep_versions, 2);
        assert_eq!(config.output.dir, "docs");
    }

    #[test]
    fn test_config_serialization() {
        let config = BasemapConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("keep_versions"));
        assert!(toml_str.contains("[output]"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BasemapConfig = toml::from_str("[store]\nkeep_versions = 5\n").unwrap();
        assert_eq!(config.store.keep_versions, 5);
        assert_eq!(config.store.dir, ".basemap/store");
        assert_eq!(config.output.dir, "docs");
    }

    #[test]
    fn test_expand_env_passthrough() {
        assert_eq!(expand_env("plain/dir").unwrap(), "plain/dir");
        assert!(expand_env("${BASEMAP_TEST_SURELY_UNSET_VAR}").is_err());
    }

    #[test]
    fn test_project_root_discovery() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = ProjectContext::find_from(&nested).unwrap();
        assert_eq!(ctx.project_root, dir.path());
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.output_dir().unwrap(), dir.path().join("docs"));
    }
}
