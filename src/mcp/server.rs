//! MCP server implementation using pmcp (Pragmatic AI's rust-mcp-sdk).
//!
//! Serves the Odoo tools and `odoo://` resources over stdio or streamable
//! HTTP/SSE. The HTTP mode is paired with a small axum listener answering
//! `GET /health`.

use crate::mcp::resources::ResourceRegistry;
use crate::mcp::tools::{into_payload, ToolRegistry};
use crate::odoo::OdooClient;
use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use pmcp::{
    server::streamable_http_server::StreamableHttpServer, Content, Error, ListResourcesResult,
    ReadResourceResult, RequestHandlerExtra, ResourceHandler, ResourceInfo, Server,
    ServerCapabilities, ToolHandler, ToolInfo,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The MCP server for Odoo
#[derive(Debug, Clone)]
pub struct McpServer {
    server: Arc<Mutex<Server>>,
}

impl McpServer {
    /// Create a new MCP server backed by `client`
    pub fn new(client: Arc<OdooClient>) -> Result<Self, pmcp::Error> {
        let tools = ToolRegistry::new(client.clone());
        let resources =
            ResourceRegistry::new(client).map_err(|e| Error::internal(e.to_string()))?;
        let server = Self::build_server_impl(tools, resources)?;
        Ok(Self {
            server: Arc::new(Mutex::new(server)),
        })
    }

    /// Build the MCP server with tool and resource handlers
    fn build_server_impl(
        tools: ToolRegistry,
        resources: ResourceRegistry,
    ) -> Result<Server, pmcp::Error> {
        let mut builder = Server::builder()
            .name("odoo-mcp")
            .version(env!("CARGO_PKG_VERSION"))
            .capabilities(ServerCapabilities::default());

        for tool in tools.all() {
            let tool_handler = ToolWrapper {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                input_schema: tool.input_schema.clone(),
                handler: tool.handler.clone(),
            };
            builder = builder.tool(tool_handler.name.clone(), tool_handler);
        }

        builder = builder.resources(ResourceWrapper { registry: resources });

        builder.build()
    }

    /// Run the server in stdio mode until the client disconnects
    pub async fn run(self) -> Result<(), pmcp::Error> {
        tracing::info!("Starting MCP server in stdio mode");

        // run_stdio() takes ownership of the Server
        let server = Arc::try_unwrap(self.server)
            .map_err(|_| Error::internal("Cannot unwrap Arc - multiple references exist"))?
            .into_inner();

        server.run_stdio().await
    }

    /// Run the server in HTTP/SSE mode
    pub async fn run_http(&self, addr: &str) -> Result<(SocketAddr, JoinHandle<()>), pmcp::Error> {
        tracing::info!("Starting MCP server in HTTP/SSE mode on {}", addr);

        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::invalid_params(format!("Invalid address: {}", e)))?;

        let http_server = StreamableHttpServer::new(socket_addr, self.server.clone());
        http_server.start().await
    }
}

/// Wrapper for adapting our Tool to pmcp's ToolHandler.
///
/// Failures are returned as an error payload rather than a protocol error so
/// the client always sees the error kind.
#[derive(Clone)]
struct ToolWrapper {
    name: String,
    description: Option<String>,
    input_schema: Value,
    handler: Arc<dyn crate::mcp::tools::ToolHandler>,
}

#[async_trait]
impl ToolHandler for ToolWrapper {
    async fn handle(&self, args: Value, _extra: RequestHandlerExtra) -> Result<Value, Error> {
        let outcome = self.handler.execute(args).await;
        if let Err(e) = &outcome {
            tracing::warn!(tool = %self.name, kind = e.kind(), "Tool failed: {}", e);
        }
        Ok(into_payload(outcome))
    }

    fn metadata(&self) -> Option<ToolInfo> {
        Some(ToolInfo::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        ))
    }
}

/// Wrapper for adapting the resource registry to pmcp's ResourceHandler.
///
/// Like tools, failures come back as an error payload carrying the kind.
struct ResourceWrapper {
    registry: ResourceRegistry,
}

impl ResourceWrapper {
    async fn contents(&self, uri: &str) -> Result<ReadResourceResult, Error> {
        let payload = self.registry.read_payload(uri).await;
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| Error::internal(format!("Cannot serialize resource: {}", e)))?;

        Ok(ReadResourceResult {
            contents: vec![Content::Resource {
                uri: uri.to_string(),
                text: Some(text),
                mime_type: Some("application/json".to_string()),
            }],
        })
    }

    fn listing(&self) -> ListResourcesResult {
        let resources = self
            .registry
            .templates()
            .iter()
            .map(|t| ResourceInfo {
                uri: t.uri_template.to_string(),
                name: t.name.to_string(),
                description: Some(t.description.to_string()),
                mime_type: Some("application/json".to_string()),
            })
            .collect();

        ListResourcesResult {
            resources,
            next_cursor: None,
        }
    }
}

#[async_trait]
impl ResourceHandler for ResourceWrapper {
    async fn read(&self, uri: &str, _extra: RequestHandlerExtra) -> Result<ReadResourceResult, Error> {
        self.contents(uri).await
    }

    async fn list(
        &self,
        _cursor: Option<String>,
        _extra: RequestHandlerExtra,
    ) -> Result<ListResourcesResult, Error> {
        Ok(self.listing())
    }
}

/// Create a new MCP server instance
pub fn create_mcp_server(client: Arc<OdooClient>) -> Result<McpServer, pmcp::Error> {
    McpServer::new(client)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Router answering `GET /health`
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

/// Serve the health endpoint on `addr` in the background
pub async fn serve_health(addr: &str) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Health endpoint listening on http://{}/health", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router()).await {
            tracing::error!("Health endpoint stopped: {}", e);
        }
    });

    Ok((local_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odoo::mock::{test_config, MockTransport};
    use crate::odoo::GatewayError;

    #[test]
    fn test_server_builds() {
        let client = OdooClient::with_transport(test_config(), Arc::new(MockTransport::new()));
        assert!(create_mcp_server(Arc::new(client)).is_ok());
    }

    fn resource_wrapper(mock: Arc<MockTransport>) -> ResourceWrapper {
        let client = Arc::new(OdooClient::with_transport(test_config(), mock));
        ResourceWrapper {
            registry: ResourceRegistry::new(client).unwrap(),
        }
    }

    fn resource_text(result: &ReadResourceResult) -> Value {
        match &result.contents[0] {
            Content::Resource { text: Some(text), .. } => serde_json::from_str(text).unwrap(),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resource_wrapper_reports_error_kinds() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(
            "ir.model",
            "search_read",
            GatewayError::Connectivity("no route to host".to_string()),
        );
        let wrapper = resource_wrapper(mock);

        let failed = resource_text(&wrapper.contents("odoo://models").await.unwrap());
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"]["kind"], "connectivity_error");
        assert_eq!(failed["error"]["message"], "no route to host");

        let missing = resource_text(&wrapper.contents("odoo://invoices").await.unwrap());
        assert_eq!(missing["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_resource_wrapper_success_and_listing() {
        let mock = Arc::new(MockTransport::new());
        mock.reply("ir.model", "search_read", json!([{"model": "res.partner", "name": "Contact"}]));
        let wrapper = resource_wrapper(mock);

        let result = wrapper.contents("odoo://models").await.unwrap();
        assert_eq!(
            resource_text(&result),
            json!({"success": true, "result": [{"model": "res.partner", "name": "Contact"}]})
        );

        let listing = wrapper.listing();
        assert_eq!(listing.resources.len(), 4);
        assert!(listing.next_cursor.is_none());
        assert!(listing
            .resources
            .iter()
            .any(|r| r.uri == "odoo://record/{model_name}/{record_id}"));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, handle) = serve_health("127.0.0.1:0").await.unwrap();

        let body: Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body, json!({"status": "ok"}));
        handle.abort();
    }
}
