//! # Odoo MCP
//!
//! A Model Context Protocol (MCP) server exposing an Odoo ERP instance to
//! MCP clients over XML-RPC.
//!
//! ## Architecture
//!
//! - [`odoo`]: the RPC gateway (session, `invoke`, convenience wrappers) and
//!   its XML-RPC transport
//! - [`mcp`]: tool and resource registries and the pmcp server (stdio and
//!   HTTP/SSE)
//! - [`config`]: configuration from environment variables and an optional file

pub mod config;
pub mod mcp;
pub mod odoo;

// Re-export commonly used types
pub use config::{AppConfig, OdooConfig};
pub use odoo::{GatewayError, OdooClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
