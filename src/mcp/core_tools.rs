//! Generic record tools and the HR lookups.

use std::sync::Arc;

use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::tools::{parse_args, parse_date, ToolError, ToolHandler};
use crate::odoo::{OdooClient, SearchOptions};

/// Limit applied to `search`/`search_read` through `execute_method` when the
/// caller gives none, so an unbounded query cannot flood the client
pub const DEFAULT_SEARCH_LIMIT: u64 = 100;

/// Handler for `execute_method`: any method on any model
#[derive(Debug)]
pub struct ExecuteMethodHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct ExecuteMethodArgs {
    model: String,
    method: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Map<String, Value>,
}

/// Index of the positional `limit` argument, for methods that take one
fn positional_limit_index(method: &str) -> Option<usize> {
    match method {
        // search(domain, offset, limit, order)
        "search" => Some(2),
        // search_read(domain, fields, offset, limit, order)
        "search_read" => Some(3),
        _ => None,
    }
}

#[async_trait::async_trait]
impl ToolHandler for ExecuteMethodHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let ExecuteMethodArgs {
            model,
            method,
            args,
            mut kwargs,
        } = parse_args(args)?;

        if let Some(index) = positional_limit_index(&method) {
            if args.len() <= index && !kwargs.contains_key("limit") {
                kwargs.insert("limit".to_string(), json!(DEFAULT_SEARCH_LIMIT));
            }
        }

        Ok(self.client.invoke(&model, &method, args, kwargs).await?)
    }
}

/// Handler for `search_records`
#[derive(Debug)]
pub struct SearchRecordsHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct SearchRecordsArgs {
    model: String,
    #[serde(default = "empty_domain")]
    domain: Value,
    fields: Option<Vec<String>>,
    #[serde(default)]
    offset: u64,
    limit: Option<u64>,
    order: Option<String>,
}

fn empty_domain() -> Value {
    json!([])
}

#[async_trait::async_trait]
impl ToolHandler for SearchRecordsHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchRecordsArgs = parse_args(args)?;
        if !args.domain.is_array() {
            return Err(ToolError::InvalidArguments(
                "'domain' must be a list of conditions".to_string(),
            ));
        }

        let mut options = SearchOptions::new().offset(args.offset);
        options.limit = args.limit;
        options.order = args.order;

        Ok(self
            .client
            .search_read(&args.model, args.domain, args.fields.as_deref(), &options)
            .await?)
    }
}

/// Handler for `read_records`
#[derive(Debug)]
pub struct ReadRecordsHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct ReadRecordsArgs {
    model: String,
    ids: Vec<i64>,
    fields: Option<Vec<String>>,
}

#[async_trait::async_trait]
impl ToolHandler for ReadRecordsHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ReadRecordsArgs = parse_args(args)?;
        Ok(self
            .client
            .read(&args.model, &args.ids, args.fields.as_deref())
            .await?)
    }
}

/// Handler for `create_record`
#[derive(Debug)]
pub struct CreateRecordHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordArgs {
    model: String,
    values: Map<String, Value>,
}

#[async_trait::async_trait]
impl ToolHandler for CreateRecordHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CreateRecordArgs = parse_args(args)?;
        let id = self
            .client
            .create(&args.model, Value::Object(args.values))
            .await?;
        Ok(json!({ "id": id }))
    }
}

/// Handler for `update_record`
#[derive(Debug)]
pub struct UpdateRecordHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct UpdateRecordArgs {
    model: String,
    ids: Vec<i64>,
    values: Map<String, Value>,
}

#[async_trait::async_trait]
impl ToolHandler for UpdateRecordHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: UpdateRecordArgs = parse_args(args)?;
        Ok(self
            .client
            .write(&args.model, &args.ids, Value::Object(args.values))
            .await?)
    }
}

/// Handler for `delete_record`
#[derive(Debug)]
pub struct DeleteRecordHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct DeleteRecordArgs {
    model: String,
    ids: Vec<i64>,
}

#[async_trait::async_trait]
impl ToolHandler for DeleteRecordHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: DeleteRecordArgs = parse_args(args)?;
        Ok(self.client.unlink(&args.model, &args.ids).await?)
    }
}

/// Handler for `list_models`
#[derive(Debug)]
pub struct ListModelsHandler {
    pub client: Arc<OdooClient>,
}

#[async_trait::async_trait]
impl ToolHandler for ListModelsHandler {
    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(self.client.list_models().await?)
    }
}

/// Handler for `search_employee`
#[derive(Debug)]
pub struct SearchEmployeeHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct SearchEmployeeArgs {
    name: String,
    #[serde(default = "default_employee_limit")]
    limit: u64,
}

fn default_employee_limit() -> u64 {
    20
}

#[async_trait::async_trait]
impl ToolHandler for SearchEmployeeHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchEmployeeArgs = parse_args(args)?;

        let mut kwargs = Map::new();
        kwargs.insert("name".to_string(), json!(args.name));
        kwargs.insert("limit".to_string(), json!(args.limit));
        let result = self
            .client
            .invoke("hr.employee", "name_search", Vec::new(), kwargs)
            .await?;

        // name_search answers [[id, display_name], ...]
        let pairs = result.as_array().ok_or_else(|| {
            ToolError::UnexpectedResponse(format!("name_search returned {}", result))
        })?;
        pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([id, name]) => Ok(json!({ "id": id, "name": name })),
                _ => Err(ToolError::UnexpectedResponse(format!(
                    "name_search entry {} is not an [id, name] pair",
                    pair
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// Handler for `search_holidays`
#[derive(Debug)]
pub struct SearchHolidaysHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct SearchHolidaysArgs {
    start_date: String,
    end_date: String,
    employee_id: Option<i64>,
}

const HOLIDAY_FIELDS: &[&str] = &[
    "display_name",
    "start_datetime",
    "stop_datetime",
    "employee_id",
    "name",
    "state",
];

/// Domain for leaves overlapping `[start, end]`.
///
/// Leave datetimes are stored in UTC, so the window opens at 23:00 on the
/// day before `start` and closes at 22:59:59 on `end`.
fn holidays_domain(start: chrono::NaiveDate, end: chrono::NaiveDate, employee_id: Option<i64>) -> Value {
    let window_start = start - Duration::days(1);
    let mut domain = vec![
        json!("&"),
        json!(["start_datetime", "<=", format!("{} 22:59:59", end.format("%Y-%m-%d"))]),
        json!(["stop_datetime", ">=", format!("{} 23:00:00", window_start.format("%Y-%m-%d"))]),
    ];
    if let Some(employee_id) = employee_id {
        domain.push(json!(["employee_id", "=", employee_id]));
    }
    Value::Array(domain)
}

#[async_trait::async_trait]
impl ToolHandler for SearchHolidaysHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchHolidaysArgs = parse_args(args)?;
        let start = parse_date("start_date", &args.start_date)?;
        let end = parse_date("end_date", &args.end_date)?;

        let fields: Vec<String> = HOLIDAY_FIELDS.iter().map(|f| f.to_string()).collect();
        Ok(self
            .client
            .search_read(
                "hr.leave.report.calendar",
                holidays_domain(start, end, args.employee_id),
                Some(&fields),
                &SearchOptions::new(),
            )
            .await?)
    }
}
