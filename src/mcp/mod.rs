//! MCP (Model Context Protocol) front-end: tools, resources and the server.

mod business_tools;
mod core_tools;
pub mod resources;
pub mod server;
mod tools;

pub use resources::{ResourceError, ResourceRegistry};
pub use server::{health_router, serve_health, McpServer};
pub use tools::{into_payload, Tool, ToolError, ToolHandler, ToolRegistry};
