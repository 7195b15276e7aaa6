use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};

pub const FORGE_DIR: &str = ".buildforge";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "buildforge.db";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    pub project: ProjectConfig,
    pub logging: LoggingConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "my-project".to_string(),
            user: "local".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ForgeConfig {
    pub fn for_project(name: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig {
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load the config file, falling back to defaults when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        let level = &self.logging.level;
        format!(
            "buildforge={level},orchestrator={level},db={level},events={level}",
            level = level
        )
    }
}

/// The `.buildforge` directory of one project.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn current() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(FORGE_DIR)
    }

    pub fn exists(&self) -> bool {
        self.dir().exists()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE)
    }

    /// Database inside the workspace, or next to it when not initialized.
    pub fn db_path(&self) -> PathBuf {
        if self.exists() {
            self.dir().join(DEFAULT_DB_NAME)
        } else {
            self.root.join(DEFAULT_DB_NAME)
        }
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.db_path().display())
    }

    pub fn project_name(&self) -> String {
        self.root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("my-project")
            .to_string()
    }
}
