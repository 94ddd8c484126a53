//! Read-only `odoo://` resources.
//!
//! | URI | Content |
//! |---|---|
//! | `odoo://models` | every installed model |
//! | `odoo://model/{model_name}` | model description and its fields |
//! | `odoo://record/{model_name}/{record_id}` | one record, all fields |
//! | `odoo://search/{model_name}/{domain}` | first 10 matches of a URL-encoded JSON domain |

use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::odoo::{GatewayError, OdooClient, SearchOptions};

/// Records returned by `odoo://search/...`
pub const SEARCH_RESOURCE_LIMIT: u64 = 10;

const FIELD_ATTRIBUTES: &[&str] = &["string", "help", "type", "required", "readonly", "relation"];

/// Resource failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid resource URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("invalid URI template '{0}'")]
    InvalidTemplate(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ResourceError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceError::NotFound(_) => "not_found",
            ResourceError::InvalidUri { .. } => "invalid_uri",
            ResourceError::InvalidTemplate(_) => "invalid_template",
            ResourceError::Gateway(e) => e.kind().as_str(),
        }
    }

    /// Error payload sent to the client, shaped like a failed tool call
    pub fn payload(&self) -> Value {
        let message = match self {
            ResourceError::Gateway(e) => e.message().to_string(),
            other => other.to_string(),
        };
        json!({
            "success": false,
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Models,
    Model,
    Record,
    Search,
}

/// A URI template and its description, as advertised to clients
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    kind: ResourceKind,
    pattern: Regex,
}

/// Compile `odoo://record/{model_name}/{record_id}` into an anchored regex with
/// one named group per placeholder. The last placeholder takes the rest of
/// the URI.
fn compile_template(template: &str) -> Result<Regex, ResourceError> {
    let mut pattern = String::from("^");
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| ResourceError::InvalidTemplate(template.to_string()))?;
        pattern.push_str(&regex::escape(&rest[..open]));

        let name = &rest[open + 1..close];
        rest = &rest[close + 1..];
        let segment = if rest.contains('{') { "[^/]+" } else { ".+" };
        pattern.push_str(&format!("(?P<{}>{})", name, segment));
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    Regex::new(&pattern).map_err(|_| ResourceError::InvalidTemplate(template.to_string()))
}

/// Registry of resource templates bound to a gateway
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    client: Arc<OdooClient>,
    templates: Vec<ResourceTemplate>,
}

impl ResourceRegistry {
    pub fn new(client: Arc<OdooClient>) -> Result<Self, ResourceError> {
        let definitions = [
            (
                ResourceKind::Models,
                "odoo://models",
                "models",
                "All models installed on the Odoo server",
            ),
            (
                ResourceKind::Model,
                "odoo://model/{model_name}",
                "model",
                "Model description with its field definitions",
            ),
            (
                ResourceKind::Record,
                "odoo://record/{model_name}/{record_id}",
                "record",
                "A single record by id",
            ),
            (
                ResourceKind::Search,
                "odoo://search/{model_name}/{domain}",
                "search",
                "First 10 records matching a URL-encoded JSON domain",
            ),
        ];

        let templates = definitions
            .into_iter()
            .map(|(kind, uri_template, name, description)| {
                Ok(ResourceTemplate {
                    uri_template,
                    name,
                    description,
                    kind,
                    pattern: compile_template(uri_template)?,
                })
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;

        Ok(Self { client, templates })
    }

    pub fn templates(&self) -> &[ResourceTemplate] {
        &self.templates
    }

    /// Read `uri` into the `{"success": ...}` envelope used by tools
    pub async fn read_payload(&self, uri: &str) -> Value {
        match self.read(uri).await {
            Ok(result) => json!({ "success": true, "result": result }),
            Err(e) => {
                tracing::warn!(uri, kind = e.kind(), "Resource read failed: {}", e);
                e.payload()
            }
        }
    }

    /// Resolve a URI and fetch its content
    pub async fn read(&self, uri: &str) -> Result<Value, ResourceError> {
        let (template, captures) = self
            .templates
            .iter()
            .find_map(|t| t.pattern.captures(uri).map(|c| (t, c)))
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))?;
        let param = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str())
                .unwrap_or_default()
        };
        let model_name = param("model_name");
        let record_id = param("record_id");
        let domain = param("domain");

        tracing::debug!(uri, resource = template.name, "Reading resource");
        match template.kind {
            ResourceKind::Models => Ok(self.client.list_models().await?),
            ResourceKind::Model => self.model_info(model_name).await,
            ResourceKind::Record => {
                let id = record_id.parse::<i64>().map_err(|_| ResourceError::InvalidUri {
                    uri: uri.to_string(),
                    reason: format!("record id '{}' is not an integer", record_id),
                })?;
                self.record(model_name, id).await
            }
            ResourceKind::Search => {
                let domain = decode_domain(domain).map_err(|reason| {
                    ResourceError::InvalidUri {
                        uri: uri.to_string(),
                        reason,
                    }
                })?;
                Ok(self
                    .client
                    .search_read(
                        model_name,
                        domain,
                        None,
                        &SearchOptions::new().limit(SEARCH_RESOURCE_LIMIT),
                    )
                    .await?)
            }
        }
    }

    async fn model_info(&self, model: &str) -> Result<Value, ResourceError> {
        let found = self
            .client
            .search_read(
                "ir.model",
                json!([["model", "=", model]]),
                None,
                &SearchOptions::new().limit(1),
            )
            .await?;
        let info = found
            .get(0)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("model '{}'", model)))?;

        let mut kwargs = Map::new();
        kwargs.insert("attributes".to_string(), json!(FIELD_ATTRIBUTES));
        let fields = self
            .client
            .invoke(model, "fields_get", Vec::new(), kwargs)
            .await?;

        Ok(json!({ "model": info, "fields": fields }))
    }

    async fn record(&self, model: &str, id: i64) -> Result<Value, ResourceError> {
        let records = self.client.read(model, &[id], None).await?;
        records
            .get(0)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(format!("{} record {}", model, id)))
    }
}

/// URL-decode and parse a domain segment; it must be a JSON list
fn decode_domain(raw: &str) -> Result<Value, String> {
    let decoded = urlencoding::decode(raw).map_err(|e| format!("bad percent-encoding: {}", e))?;
    let domain: Value =
        serde_json::from_str(&decoded).map_err(|e| format!("domain is not JSON: {}", e))?;
    if domain.is_array() {
        Ok(domain)
    } else {
        Err("domain must be a JSON list".to_string())
    }
}
