use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure for forgewatch.
///
/// Holds the instance connection settings and the discovery filters. Loaded
/// on start from the current directory or the user config directory, and
/// saved back whenever the organization list changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Forgejo instance URL (e.g., 'https://codeberg.org')
    #[serde(default)]
    pub base_url: String,

    /// Personal access token
    pub token: Option<String>,

    /// Regex selecting repositories to monitor, matched against full and
    /// short names
    #[serde(default = "default_match_all")]
    pub repo_pattern: String,

    /// Regex selecting workflows, matched against workflow name and job path
    #[serde(default = "default_match_all")]
    pub workflow_pattern: String,

    /// Regex selecting branches; empty means all branches
    #[serde(default = "default_branch_pattern")]
    pub branch_pattern: String,

    /// Organizations whose repositories are scanned
    #[serde(default)]
    pub organizations: Vec<String>,

    /// Seconds between automatic refreshes; 0 disables periodic refresh
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            repo_pattern: default_match_all(),
            workflow_pattern: default_match_all(),
            branch_pattern: default_branch_pattern(),
            organizations: Vec::new(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_match_all() -> String {
    ".*".to_string()
}

fn default_branch_pattern() -> String {
    "^main$".to_string()
}

fn default_refresh_interval() -> u64 {
    30
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches in this order:
    /// 1. Specified path
    /// 2. ./forgewatch.toml
    /// 3. ./forgewatch.json
    /// 4. ./forgewatch.yaml
    /// 5. ./forgewatch.yml
    /// 6. {config_dir}/forgewatch/config.toml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "forgewatch.toml",
            "forgewatch.json",
            "forgewatch.yaml",
            "forgewatch.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Default per-user configuration file location.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("forgewatch").join("config.toml"))
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
