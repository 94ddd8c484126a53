//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::business_tools::{
    CheckProductAvailabilityHandler, CreateInventoryAdjustmentHandler, CreateJournalEntryHandler,
    CreateOrderHandler, OrderKind, SearchJournalEntriesHandler, SearchOrdersHandler,
};
use super::core_tools::{
    CreateRecordHandler, DeleteRecordHandler, ExecuteMethodHandler, ListModelsHandler,
    ReadRecordsHandler, SearchEmployeeHandler, SearchHolidaysHandler, SearchRecordsHandler,
    UpdateRecordHandler,
};
use crate::odoo::{GatewayError, OdooClient};

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_records")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Why a tool call failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unexpected response from Odoo: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ToolError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::NotFound(_) => "not_found",
            ToolError::UnexpectedResponse(_) => "unexpected_response",
            ToolError::Gateway(e) => e.kind().as_str(),
        }
    }

    /// Error payload sent to the client
    pub fn payload(&self) -> Value {
        let message = match self {
            ToolError::Gateway(e) => e.message().to_string(),
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

/// Wrap a tool outcome in the `{"success": ...}` envelope
pub fn into_payload(outcome: Result<Value, ToolError>) -> Value {
    match outcome {
        Ok(result) => json!({ "success": true, "result": result }),
        Err(e) => e.payload(),
    }
}

/// Deserialize tool arguments; a missing argument object counts as `{}`
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Parse a `YYYY-MM-DD` argument
pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ToolError::InvalidArguments(format!(
            "invalid {} '{}', expected YYYY-MM-DD",
            field, value
        ))
    })
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create a registry with every tool bound to `client`
    pub fn new(client: Arc<OdooClient>) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        registry.register_generic_tools(&client);
        registry.register_hr_tools(&client);
        registry.register_business_tools(&client);

        registry
    }

    fn register_generic_tools(&mut self, client: &Arc<OdooClient>) {
        // 1. execute_method - Raw pass-through to execute_kw
        self.register(Tool {
            name: "execute_method".to_string(),
            description: "Execute any method on an Odoo model. \
                          search and search_read default to 100 results unless a limit is given."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {
                        "type": "string",
                        "description": "Technical model name (e.g., 'res.partner')"
                    },
                    "method": {
                        "type": "string",
                        "description": "Method to call (e.g., 'search_read', 'action_confirm')"
                    },
                    "args": {
                        "type": "array",
                        "description": "Positional arguments",
                        "default": []
                    },
                    "kwargs": {
                        "type": "object",
                        "description": "Keyword arguments",
                        "default": {}
                    }
                },
                "required": ["model", "method"]
            }),
            handler: Arc::new(ExecuteMethodHandler {
                client: client.clone(),
            }),
        });

        // 2. search_records - search_read with paging
        self.register(Tool {
            name: "search_records".to_string(),
            description: "Search records of a model and return the requested fields".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {
                        "type": "string",
                        "description": "Technical model name"
                    },
                    "domain": {
                        "type": "array",
                        "description": "Odoo domain, e.g. [[\"is_company\", \"=\", true]]",
                        "default": []
                    },
                    "fields": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Fields to return (all when omitted)"
                    },
                    "offset": {
                        "type": "integer",
                        "minimum": 0,
                        "default": 0
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1
                    },
                    "order": {
                        "type": "string",
                        "description": "Sort specification, e.g. 'name asc'"
                    }
                },
                "required": ["model"]
            }),
            handler: Arc::new(SearchRecordsHandler {
                client: client.clone(),
            }),
        });

        // 3. read_records - read by ids
        self.register(Tool {
            name: "read_records".to_string(),
            description: "Read records of a model by id".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string"},
                    "ids": {
                        "type": "array",
                        "items": {"type": "integer"}
                    },
                    "fields": {
                        "type": "array",
                        "items": {"type": "string"}
                    }
                },
                "required": ["model", "ids"]
            }),
            handler: Arc::new(ReadRecordsHandler {
                client: client.clone(),
            }),
        });

        // 4. create_record
        self.register(Tool {
            name: "create_record".to_string(),
            description: "Create a record and return its id".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string"},
                    "values": {
                        "type": "object",
                        "description": "Field values of the new record"
                    }
                },
                "required": ["model", "values"]
            }),
            handler: Arc::new(CreateRecordHandler {
                client: client.clone(),
            }),
        });

        // 5. update_record
        self.register(Tool {
            name: "update_record".to_string(),
            description: "Write field values on existing records".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string"},
                    "ids": {
                        "type": "array",
                        "items": {"type": "integer"}
                    },
                    "values": {"type": "object"}
                },
                "required": ["model", "ids", "values"]
            }),
            handler: Arc::new(UpdateRecordHandler {
                client: client.clone(),
            }),
        });

        // 6. delete_record
        self.register(Tool {
            name: "delete_record".to_string(),
            description: "Delete records by id".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {"type": "string"},
                    "ids": {
                        "type": "array",
                        "items": {"type": "integer"}
                    }
                },
                "required": ["model", "ids"]
            }),
            handler: Arc::new(DeleteRecordHandler {
                client: client.clone(),
            }),
        });

        // 7. list_models
        self.register(Tool {
            name: "list_models".to_string(),
            description: "List the models installed on the Odoo server".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
            handler: Arc::new(ListModelsHandler {
                client: client.clone(),
            }),
        });
    }

    fn register_hr_tools(&mut self, client: &Arc<OdooClient>) {
        // 8. search_employee
        self.register(Tool {
            name: "search_employee".to_string(),
            description: "Search employees by name".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name or part of a name"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": 20
                    }
                },
                "required": ["name"]
            }),
            handler: Arc::new(SearchEmployeeHandler {
                client: client.clone(),
            }),
        });

        // 9. search_holidays
        self.register(Tool {
            name: "search_holidays".to_string(),
            description: "Search time off overlapping a date range".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "First day (YYYY-MM-DD)"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "Last day (YYYY-MM-DD)"
                    },
                    "employee_id": {
                        "type": "integer",
                        "description": "Only this employee"
                    }
                },
                "required": ["start_date", "end_date"]
            }),
            handler: Arc::new(SearchHolidaysHandler {
                client: client.clone(),
            }),
        });
    }

    fn register_business_tools(&mut self, client: &Arc<OdooClient>) {
        // 10-13. sales and purchase orders share their shape
        for kind in [OrderKind::Sale, OrderKind::Purchase] {
            self.register(Tool {
                name: kind.search_tool_name().to_string(),
                description: format!("Search {}", kind.plural_label()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "partner_id": {
                            "type": "integer",
                            "description": kind.partner_label()
                        },
                        "date_from": {
                            "type": "string",
                            "description": "Ordered on or after (YYYY-MM-DD)"
                        },
                        "date_to": {
                            "type": "string",
                            "description": "Ordered on or before (YYYY-MM-DD)"
                        },
                        "state": {
                            "type": "string",
                            "description": "Order state (e.g., 'draft', 'sale', 'purchase')"
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "default": 20
                        },
                        "offset": {
                            "type": "integer",
                            "minimum": 0,
                            "default": 0
                        },
                        "order": {
                            "type": "string",
                            "description": "Sort specification, e.g. 'date_order desc'"
                        }
                    }
                }),
                handler: Arc::new(SearchOrdersHandler {
                    client: client.clone(),
                    kind,
                }),
            });

            self.register(Tool {
                name: kind.create_tool_name().to_string(),
                description: format!("Create a {} with order lines", kind.label()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "partner_id": {
                            "type": "integer",
                            "description": kind.partner_label()
                        },
                        "order_lines": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "product_id": {"type": "integer"},
                                    (kind.quantity_field()): {"type": "number"},
                                    "price_unit": {"type": "number"}
                                },
                                "required": ["product_id", kind.quantity_field()]
                            }
                        },
                        "date_order": {
                            "type": "string",
                            "description": "Order date (YYYY-MM-DD)"
                        }
                    },
                    "required": ["partner_id", "order_lines"]
                }),
                handler: Arc::new(CreateOrderHandler {
                    client: client.clone(),
                    kind,
                }),
            });
        }

        // 14. check_product_availability
        self.register(Tool {
            name: "check_product_availability".to_string(),
            description: "Check stock quantities of products, optionally in one location"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "product_ids": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "minItems": 1
                    },
                    "location_id": {
                        "type": "integer",
                        "description": "Stock location (all internal locations when omitted)"
                    }
                },
                "required": ["product_ids"]
            }),
            handler: Arc::new(CheckProductAvailabilityHandler {
                client: client.clone(),
            }),
        });

        // 15. search_journal_entries
        self.register(Tool {
            name: "search_journal_entries".to_string(),
            description: "Search journal entries with their lines".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date_from": {
                        "type": "string",
                        "description": "Accounting date on or after (YYYY-MM-DD)"
                    },
                    "date_to": {
                        "type": "string",
                        "description": "Accounting date on or before (YYYY-MM-DD)"
                    },
                    "journal_id": {"type": "integer"},
                    "state": {
                        "type": "string",
                        "enum": ["draft", "posted", "cancel"]
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "default": 20
                    },
                    "offset": {
                        "type": "integer",
                        "minimum": 0,
                        "default": 0
                    }
                }
            }),
            handler: Arc::new(SearchJournalEntriesHandler {
                client: client.clone(),
            }),
        });

        // 16. create_inventory_adjustment
        self.register(Tool {
            name: "create_inventory_adjustment".to_string(),
            description: "Set counted stock quantities and apply them".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name or description of the adjustment"
                    },
                    "adjustment_lines": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "product_id": {"type": "integer"},
                                "location_id": {"type": "integer"},
                                "product_qty": {
                                    "type": "number",
                                    "description": "Counted quantity"
                                }
                            },
                            "required": ["product_id", "location_id", "product_qty"]
                        }
                    },
                    "date": {
                        "type": "string",
                        "description": "Adjustment date (YYYY-MM-DD), used where stock.inventory exists"
                    }
                },
                "required": ["name", "adjustment_lines"]
            }),
            handler: Arc::new(CreateInventoryAdjustmentHandler {
                client: client.clone(),
            }),
        });

        // 17. create_journal_entry
        self.register(Tool {
            name: "create_journal_entry".to_string(),
            description: "Create a balanced journal entry".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "journal_id": {"type": "integer"},
                    "lines": {
                        "type": "array",
                        "minItems": 1,
                        "description": "Total debit must equal total credit",
                        "items": {
                            "type": "object",
                            "properties": {
                                "account_id": {"type": "integer"},
                                "debit": {"type": "number", "default": 0},
                                "credit": {"type": "number", "default": 0},
                                "name": {"type": "string"},
                                "partner_id": {"type": "integer"}
                            },
                            "required": ["account_id"]
                        }
                    },
                    "ref": {"type": "string"},
                    "date": {
                        "type": "string",
                        "description": "Accounting date (YYYY-MM-DD)"
                    }
                },
                "required": ["journal_id", "lines"]
            }),
            handler: Arc::new(CreateJournalEntryHandler {
                client: client.clone(),
            }),
        });
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all tools, sorted by name
    pub fn all(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<&str> {
        self.all().into_iter().map(|t| t.name.as_str()).collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.handler.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odoo::mock::{test_config, MockTransport};

    fn registry() -> ToolRegistry {
        let client = OdooClient::with_transport(test_config(), Arc::new(MockTransport::new()));
        ToolRegistry::new(Arc::new(client))
    }

    #[test]
    fn test_all_tools_registered() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                "check_product_availability",
                "create_inventory_adjustment",
                "create_journal_entry",
                "create_purchase_order",
                "create_record",
                "create_sales_order",
                "delete_record",
                "execute_method",
                "list_models",
                "read_records",
                "search_employee",
                "search_holidays",
                "search_journal_entries",
                "search_purchase_orders",
                "search_records",
                "search_sales_orders",
                "update_record",
            ]
        );
    }

    #[test]
    fn test_schemas_are_objects() {
        for tool in registry().all() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            if let Some(required) = tool.input_schema.get("required") {
                let properties = tool.input_schema["properties"].as_object().unwrap();
                for field in required.as_array().unwrap() {
                    assert!(
                        properties.contains_key(field.as_str().unwrap()),
                        "{} requires undeclared {}",
                        tool.name,
                        field
                    );
                }
            }
        }
    }

    #[test]
    fn test_order_line_schema_uses_kind_quantity() {
        let registry = registry();
        let sale = &registry.get("create_sales_order").unwrap().input_schema;
        let purchase = &registry.get("create_purchase_order").unwrap().input_schema;

        let line = |schema: &Value| schema["properties"]["order_lines"]["items"]["required"].clone();
        assert_eq!(line(sale), json!(["product_id", "product_uom_qty"]));
        assert_eq!(line(purchase), json!(["product_id", "product_qty"]));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = registry().execute("nope", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("nope".to_string()));
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn test_payload_envelope() {
        assert_eq!(
            into_payload(Ok(json!([1, 2]))),
            json!({"success": true, "result": [1, 2]})
        );
        assert_eq!(
            into_payload(Err(ToolError::Gateway(GatewayError::Authentication(
                "credentials rejected".to_string()
            )))),
            json!({
                "success": false,
                "error": {"kind": "authentication_error", "message": "credentials rejected"}
            })
        );
    }

    #[test]
    fn test_parse_args_null_is_empty_object() {
        #[derive(Debug, serde::Deserialize)]
        struct Args {
            #[serde(default)]
            limit: Option<u64>,
        }

        let args: Args = parse_args(Value::Null).unwrap();
        assert_eq!(args.limit, None);

        let err = parse_args::<Args>(json!({"limit": "ten"})).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("date_from", "2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("date_from", "2023-02-29").is_err());
        assert!(parse_date("date_from", "yesterday").is_err());
    }
}
