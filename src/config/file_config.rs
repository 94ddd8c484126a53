//! Configuration file support for odoo-mcp.
//!
//! Settings can be kept in a TOML or JSON file; environment variables are
//! layered on top by [`AppConfig::resolve`](super::AppConfig::resolve).
//!
//! # Configuration File Format
//!
//! ```toml
//! [odoo]
//! url = "https://erp.example.com"
//! database = "production"
//! username = "bot@example.com"
//! password = "secret"
//! timeout = 60
//! verify_ssl = true
//!
//! [mcp]
//! transport = "sse"
//! host = "0.0.0.0"
//! port = 8000
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure; every field is optional
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Connection to the Odoo server
    #[serde(default)]
    pub odoo: OdooSection,

    /// MCP server settings
    #[serde(default)]
    pub mcp: McpSection,
}

/// `[odoo]` section
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdooSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_ssl: Option<bool>,
}

/// `[mcp]` section
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl ConfigFile {
    /// Load a TOML or JSON file (format picked from the extension)
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Err(ConfigFileError::NotFound(path.to_path_buf()));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| ConfigFileError::Parse(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| ConfigFileError::Parse(e.to_string()))
    }

    /// Save as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }

    /// Template written by `odoo-mcp init-config`
    pub fn template() -> Self {
        Self {
            odoo: OdooSection {
                url: Some("https://erp.example.com".to_string()),
                database: Some("production".to_string()),
                username: Some("bot@example.com".to_string()),
                password: None,
                timeout: Some(60),
                verify_ssl: Some(false),
            },
            mcp: McpSection {
                transport: Some("stdio".to_string()),
                host: Some("0.0.0.0".to_string()),
                port: Some(8000),
                health_port: None,
                log_level: Some("info".to_string()),
                log_format: Some("text".to_string()),
            },
        }
    }
}

/// Default location of the config file (`~/.config/odoo-mcp/config.toml`),
/// returned only if it exists
pub fn find_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("odoo-mcp").join("config.toml");
    path.exists().then_some(path)
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}
