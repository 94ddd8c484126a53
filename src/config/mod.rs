//! Configuration management.
//!
//! Settings are resolved as defaults < config file < environment. Required
//! connection settings must be present after resolution, otherwise startup
//! aborts before any transport is opened.

mod file_config;

pub use file_config::{find_config_file, ConfigFile, ConfigFileError, McpSection, OdooSection};

use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variables read by [`AppConfig::from_env`]
pub const ENV_VARS: &[(&str, &str)] = &[
    ("ODOO_URL", "Odoo server URL (required)"),
    ("ODOO_DB", "Database name (required)"),
    ("ODOO_USERNAME", "Login (required)"),
    ("ODOO_PASSWORD", "Password or API key (required)"),
    ("ODOO_TIMEOUT", "Per-call timeout in seconds (default: 60)"),
    ("ODOO_VERIFY_SSL", "Verify TLS certificates (default: false)"),
    ("MCP_TRANSPORT", "stdio or sse (default: stdio)"),
    ("HOST", "Bind host in sse mode (default: 0.0.0.0)"),
    ("PORT", "Bind port in sse mode (default: 8000)"),
    ("HEALTH_PORT", "Health endpoint port in sse mode (default: PORT + 1)"),
    ("LOG_LEVEL", "Log verbosity (default: INFO)"),
    ("LOG_FORMAT", "text or json (default: text)"),
    ("MCP_CONFIG_FILE", "Optional TOML/JSON config file"),
];

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Connection profile for the Odoo server
#[derive(Clone, PartialEq)]
pub struct OdooConfig {
    /// Server URL without trailing slash
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub verify_ssl: bool,
}

impl std::fmt::Debug for OdooConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdooConfig")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

/// MCP transport binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// JSON-RPC over stdin/stdout
    Stdio,
    /// HTTP with server-sent events
    Sse,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportMode::Stdio),
            "sse" | "http" => Ok(TransportMode::Sse),
            other => Err(format!("must be 'stdio' or 'sse', got '{}'", other)),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("must be 'text' or 'json', got '{}'", other)),
        }
    }
}

/// MCP server settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub transport: TransportMode,
    pub host: String,
    pub port: u16,
    /// Port of the `/health` listener in sse mode
    pub health_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// `host:port` of the MCP endpoint
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `host:port` of the health endpoint
    pub fn health_addr(&self) -> String {
        format!("{}:{}", self.host, self.health_port)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub odoo: OdooConfig,
    pub server: ServerConfig,
}

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    File(#[from] ConfigFileError),
}

impl AppConfig {
    /// Resolve from the process environment, layered over `file` (or
    /// `MCP_CONFIG_FILE`, or the default config location) when present.
    pub fn from_env(file: Option<&Path>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();

        let file = match file {
            Some(path) => Some(ConfigFile::load(path)?),
            None => match non_empty(lookup("MCP_CONFIG_FILE")) {
                Some(path) => Some(ConfigFile::load(Path::new(&path))?),
                None => match find_config_file() {
                    Some(path) => {
                        tracing::info!("Using config file: {}", path.display());
                        Some(ConfigFile::load(&path)?)
                    }
                    None => None,
                },
            },
        };

        Self::resolve(file.unwrap_or_default(), lookup)
    }

    /// Resolve from a config file and an environment lookup function.
    ///
    /// Empty environment values count as unset.
    pub fn resolve<F>(file: ConfigFile, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| non_empty(lookup(key));

        let url = required("ODOO_URL", env("ODOO_URL").or(file.odoo.url))?;
        url::Url::parse(&url).map_err(|e| ConfigError::Invalid {
            key: "ODOO_URL",
            value: url.clone(),
            reason: e.to_string(),
        })?;

        let timeout_secs = match env("ODOO_TIMEOUT") {
            Some(raw) => parse_positive("ODOO_TIMEOUT", &raw)?,
            None => file.odoo.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ODOO_TIMEOUT",
                value: "0".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        let verify_ssl = match env("ODOO_VERIFY_SSL") {
            Some(raw) => parse_bool("ODOO_VERIFY_SSL", &raw)?,
            None => file.odoo.verify_ssl.unwrap_or(false),
        };

        let odoo = OdooConfig {
            url: url.trim_end_matches('/').to_string(),
            database: required("ODOO_DB", env("ODOO_DB").or(file.odoo.database))?,
            username: required("ODOO_USERNAME", env("ODOO_USERNAME").or(file.odoo.username))?,
            password: required("ODOO_PASSWORD", env("ODOO_PASSWORD").or(file.odoo.password))?,
            timeout: Duration::from_secs(timeout_secs),
            verify_ssl,
        };

        let transport_raw = env("MCP_TRANSPORT")
            .or(file.mcp.transport)
            .unwrap_or_else(|| "stdio".to_string());
        let transport = transport_raw
            .parse::<TransportMode>()
            .map_err(|reason| ConfigError::Invalid {
                key: "MCP_TRANSPORT",
                value: transport_raw.clone(),
                reason,
            })?;

        let port = match env("PORT") {
            Some(raw) => parse_port("PORT", &raw)?,
            None => {
                let port = file.mcp.port.unwrap_or(DEFAULT_PORT);
                check_port("PORT", Some(port), &port.to_string())?
            }
        };
        let health_port = match env("HEALTH_PORT") {
            Some(raw) => parse_port("HEALTH_PORT", &raw)?,
            None => match file.mcp.health_port {
                Some(health_port) => {
                    check_port("HEALTH_PORT", Some(health_port), &health_port.to_string())?
                }
                None => port.checked_add(1).unwrap_or(port - 1),
            },
        };

        let log_format_raw = env("LOG_FORMAT")
            .or(file.mcp.log_format)
            .unwrap_or_else(|| "text".to_string());
        let log_format = log_format_raw
            .parse::<LogFormat>()
            .map_err(|reason| ConfigError::Invalid {
                key: "LOG_FORMAT",
                value: log_format_raw.clone(),
                reason,
            })?;

        let server = ServerConfig {
            transport,
            host: env("HOST")
                .or(file.mcp.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            health_port,
            log_level: env("LOG_LEVEL")
                .or(file.mcp.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format,
        };

        Ok(Self { odoo, server })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(key))
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_port(key: &'static str, raw: &str) -> Result<u16, ConfigError> {
    check_port(key, raw.trim().parse::<u16>().ok(), raw)
}

fn check_port(key: &'static str, port: Option<u16>, raw: &str) -> Result<u16, ConfigError> {
    match port {
        Some(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "must be between 1 and 65535".to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("ODOO_URL", "https://erp.example.com/"),
        ("ODOO_DB", "prod"),
        ("ODOO_USERNAME", "bot"),
        ("ODOO_PASSWORD", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::resolve(ConfigFile::default(), env(REQUIRED)).unwrap();

        assert_eq!(config.odoo.url, "https://erp.example.com");
        assert_eq!(config.odoo.timeout, Duration::from_secs(60));
        assert!(!config.odoo.verify_ssl);
        assert_eq!(config.server.transport, TransportMode::Stdio);
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.server.health_port, 8001);
        assert_eq!(config.server.log_level, "INFO");
        assert_eq!(config.server.log_format, LogFormat::Text);
    }

    #[test]
    fn test_missing_required_variable() {
        for (missing, _) in REQUIRED {
            let pairs: Vec<_> = REQUIRED
                .iter()
                .copied()
                .filter(|(k, _)| k != missing)
                .collect();
            let err = AppConfig::resolve(ConfigFile::default(), env(&pairs)).unwrap_err();
            assert_eq!(err.to_string(), format!("{} is required", missing));
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ODOO_PASSWORD", "  "));
        // later entries win in the HashMap
        let err = AppConfig::resolve(ConfigFile::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ODOO_PASSWORD")));
    }

    #[test]
    fn test_overrides_and_validation() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MCP_TRANSPORT", "SSE"),
            ("PORT", "9000"),
            ("HOST", "127.0.0.1"),
            ("ODOO_TIMEOUT", "5"),
            ("ODOO_VERIFY_SSL", "true"),
            ("LOG_FORMAT", "json"),
        ]);
        let config = AppConfig::resolve(ConfigFile::default(), env(&pairs)).unwrap();

        assert_eq!(config.server.transport, TransportMode::Sse);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.server.health_addr(), "127.0.0.1:9001");
        assert_eq!(config.odoo.timeout, Duration::from_secs(5));
        assert!(config.odoo.verify_ssl);
        assert_eq!(config.server.log_format, LogFormat::Json);

        for (key, value) in [
            ("MCP_TRANSPORT", "websocket"),
            ("PORT", "70000"),
            ("PORT", "0"),
            ("ODOO_TIMEOUT", "soon"),
            ("ODOO_TIMEOUT", "0"),
            ("ODOO_VERIFY_SSL", "maybe"),
            ("ODOO_URL", "not a url"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            let err = AppConfig::resolve(ConfigFile::default(), env(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: k, .. } if k == key),
                "{}={} should be rejected, got {:?}",
                key,
                value,
                err
            );
        }
    }

    #[test]
    fn test_health_port_zero_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("HEALTH_PORT", "0"));
        let err = AppConfig::resolve(ConfigFile::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HEALTH_PORT", .. }));

        let file = ConfigFile {
            mcp: McpSection {
                health_port: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = AppConfig::resolve(file, env(REQUIRED)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HEALTH_PORT", .. }));

        let file = ConfigFile {
            mcp: McpSection {
                port: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = AppConfig::resolve(file, env(REQUIRED)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = ConfigFile {
            odoo: OdooSection {
                url: Some("http://file.example.com".to_string()),
                database: Some("filedb".to_string()),
                username: Some("file-user".to_string()),
                password: Some("file-pass".to_string()),
                timeout: Some(30),
                verify_ssl: Some(true),
            },
            mcp: McpSection {
                transport: Some("sse".to_string()),
                port: Some(7000),
                ..Default::default()
            },
        };

        let config =
            AppConfig::resolve(file, env(&[("ODOO_DB", "envdb"), ("PORT", "7500")])).unwrap();

        assert_eq!(config.odoo.url, "http://file.example.com");
        assert_eq!(config.odoo.database, "envdb");
        assert_eq!(config.odoo.timeout, Duration::from_secs(30));
        assert!(config.odoo.verify_ssl);
        assert_eq!(config.server.transport, TransportMode::Sse);
        assert_eq!(config.server.port, 7500);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = AppConfig::resolve(ConfigFile::default(), env(REQUIRED)).unwrap();
        let debug = format!("{:?}", config.odoo);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }
}
