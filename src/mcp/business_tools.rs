//! Sales, purchase, inventory and accounting tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::tools::{parse_args, parse_date, ToolError, ToolHandler};
use crate::odoo::{OdooClient, SearchOptions};

/// Which order model a tool works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Sale,
    Purchase,
}

const ORDER_FIELDS: &[&str] = &[
    "name",
    "partner_id",
    "date_order",
    "amount_total",
    "state",
    "invoice_status",
    "user_id",
    "order_line",
];

const PURCHASE_EXTRA_FIELDS: &[&str] = &["date_planned", "date_approve"];

impl OrderKind {
    pub fn model(&self) -> &'static str {
        match self {
            OrderKind::Sale => "sale.order",
            OrderKind::Purchase => "purchase.order",
        }
    }

    /// Name of the ordered quantity on an order line
    pub fn quantity_field(&self) -> &'static str {
        match self {
            OrderKind::Sale => "product_uom_qty",
            OrderKind::Purchase => "product_qty",
        }
    }

    pub fn fields(&self) -> Vec<String> {
        let extra: &[&str] = match self {
            OrderKind::Sale => &[],
            OrderKind::Purchase => PURCHASE_EXTRA_FIELDS,
        };
        ORDER_FIELDS
            .iter()
            .chain(extra)
            .map(|f| f.to_string())
            .collect()
    }

    pub fn search_tool_name(&self) -> &'static str {
        match self {
            OrderKind::Sale => "search_sales_orders",
            OrderKind::Purchase => "search_purchase_orders",
        }
    }

    pub fn create_tool_name(&self) -> &'static str {
        match self {
            OrderKind::Sale => "create_sales_order",
            OrderKind::Purchase => "create_purchase_order",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderKind::Sale => "sales order",
            OrderKind::Purchase => "purchase order",
        }
    }

    pub fn plural_label(&self) -> &'static str {
        match self {
            OrderKind::Sale => "sales orders",
            OrderKind::Purchase => "purchase orders",
        }
    }

    pub fn partner_label(&self) -> &'static str {
        match self {
            OrderKind::Sale => "Customer (res.partner id)",
            OrderKind::Purchase => "Vendor (res.partner id)",
        }
    }
}

/// Turn a search_read/search_count result into what the tool returns
fn expect_array(value: Value, what: &str) -> Result<Vec<Value>, ToolError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ToolError::UnexpectedResponse(format!(
            "{} returned {}",
            what, other
        ))),
    }
}

/// Handler for `search_sales_orders` and `search_purchase_orders`
#[derive(Debug)]
pub struct SearchOrdersHandler {
    pub client: Arc<OdooClient>,
    pub kind: OrderKind,
}

#[derive(Debug, Deserialize)]
struct SearchOrdersArgs {
    partner_id: Option<i64>,
    date_from: Option<String>,
    date_to: Option<String>,
    state: Option<String>,
    #[serde(default = "default_page_size")]
    limit: u64,
    #[serde(default)]
    offset: u64,
    order: Option<String>,
}

fn default_page_size() -> u64 {
    20
}

#[async_trait::async_trait]
impl ToolHandler for SearchOrdersHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchOrdersArgs = parse_args(args)?;

        let mut domain = Vec::new();
        if let Some(partner_id) = args.partner_id {
            domain.push(json!(["partner_id", "=", partner_id]));
        }
        if let Some(date_from) = &args.date_from {
            parse_date("date_from", date_from)?;
            domain.push(json!(["date_order", ">=", date_from]));
        }
        if let Some(date_to) = &args.date_to {
            parse_date("date_to", date_to)?;
            domain.push(json!(["date_order", "<=", date_to]));
        }
        if let Some(state) = &args.state {
            domain.push(json!(["state", "=", state]));
        }
        let domain = Value::Array(domain);

        let mut options = SearchOptions::new().offset(args.offset).limit(args.limit);
        options.order = args.order;

        let model = self.kind.model();
        let orders = self
            .client
            .search_read(model, domain.clone(), Some(&self.kind.fields()), &options)
            .await?;
        let orders = expect_array(orders, "search_read")?;
        let total_count = self
            .client
            .invoke(model, "search_count", vec![domain], Map::new())
            .await?;

        Ok(json!({
            "count": orders.len(),
            "total_count": total_count,
            "orders": orders,
        }))
    }
}

/// Handler for `create_sales_order` and `create_purchase_order`
#[derive(Debug)]
pub struct CreateOrderHandler {
    pub client: Arc<OdooClient>,
    pub kind: OrderKind,
}

#[derive(Debug, Deserialize)]
struct CreateOrderArgs {
    partner_id: i64,
    order_lines: Vec<Map<String, Value>>,
    date_order: Option<String>,
}

impl CreateOrderHandler {
    /// `(0, 0, values)` create commands for the order's `order_line` field
    fn line_commands(&self, lines: &[Map<String, Value>]) -> Result<Vec<Value>, ToolError> {
        let quantity_field = self.kind.quantity_field();

        lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let product_id = line
                    .get("product_id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        ToolError::InvalidArguments(format!(
                            "order line {} needs an integer 'product_id'",
                            index
                        ))
                    })?;
                let quantity = line
                    .get(quantity_field)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| {
                        ToolError::InvalidArguments(format!(
                            "order line {} needs a numeric '{}'",
                            index, quantity_field
                        ))
                    })?;

                let mut values = Map::new();
                values.insert("product_id".to_string(), json!(product_id));
                values.insert(quantity_field.to_string(), json!(quantity));
                if let Some(price) = line.get("price_unit") {
                    let price = price.as_f64().ok_or_else(|| {
                        ToolError::InvalidArguments(format!(
                            "order line {} has a non-numeric 'price_unit'",
                            index
                        ))
                    })?;
                    values.insert("price_unit".to_string(), json!(price));
                }

                Ok(json!([0, 0, values]))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ToolHandler for CreateOrderHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CreateOrderArgs = parse_args(args)?;
        if args.order_lines.is_empty() {
            return Err(ToolError::InvalidArguments(
                "'order_lines' must contain at least one line".to_string(),
            ));
        }

        let mut values = Map::new();
        values.insert("partner_id".to_string(), json!(args.partner_id));
        values.insert(
            "order_line".to_string(),
            Value::Array(self.line_commands(&args.order_lines)?),
        );
        if let Some(date_order) = &args.date_order {
            parse_date("date_order", date_order)?;
            values.insert("date_order".to_string(), json!(date_order));
        }

        let model = self.kind.model();
        let created = self.client.create(model, Value::Object(values)).await?;
        let order_id = created.as_i64().ok_or_else(|| {
            ToolError::UnexpectedResponse(format!("create returned {}", created))
        })?;
        tracing::info!(model, order_id, "Created order");

        let name_field = ["name".to_string()];
        let records = self
            .client
            .read(model, &[order_id], Some(&name_field))
            .await
            .map_err(|e| e.with_context(format!("order {} was created", order_id)))?;
        let order_name = records
            .get(0)
            .and_then(|r| r.get("name"))
            .cloned()
            .ok_or_else(|| {
                ToolError::UnexpectedResponse(format!(
                    "order {} was created but could not be read back",
                    order_id
                ))
            })?;

        Ok(json!({
            "order_id": order_id,
            "order_name": order_name,
        }))
    }
}

/// Handler for `check_product_availability`
#[derive(Debug)]
pub struct CheckProductAvailabilityHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityArgs {
    product_ids: Vec<i64>,
    location_id: Option<i64>,
}

const STOCK_FIELDS: &[&str] = &[
    "qty_available",
    "virtual_available",
    "incoming_qty",
    "outgoing_qty",
];

#[async_trait::async_trait]
impl ToolHandler for CheckProductAvailabilityHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: AvailabilityArgs = parse_args(args)?;
        if args.product_ids.is_empty() {
            return Err(ToolError::InvalidArguments(
                "'product_ids' must not be empty".to_string(),
            ));
        }

        let product_fields: Vec<String> = ["name", "default_code", "type", "uom_id"]
            .iter()
            .map(|f| f.to_string())
            .collect();
        let products = self
            .client
            .search_read(
                "product.product",
                json!([["id", "in", args.product_ids]]),
                Some(&product_fields),
                &SearchOptions::new(),
            )
            .await?;
        let products = expect_array(products, "search_read")?;
        if products.is_empty() {
            return Err(ToolError::NotFound(
                "no products found for the given ids".to_string(),
            ));
        }

        let names: HashMap<i64, Value> = products
            .iter()
            .filter_map(|p| Some((p.get("id")?.as_i64()?, p.get("name")?.clone())))
            .collect();

        let mut kwargs = Map::new();
        kwargs.insert("fields".to_string(), json!(STOCK_FIELDS));
        if let Some(location_id) = args.location_id {
            kwargs.insert("context".to_string(), json!({ "location": location_id }));
        }

        let mut availability = Map::new();
        for product_id in &args.product_ids {
            let name = names
                .get(product_id)
                .cloned()
                .unwrap_or_else(|| json!(format!("Product {}", product_id)));

            let stock = self
                .client
                .invoke(
                    "product.product",
                    "read",
                    vec![json!([product_id])],
                    kwargs.clone(),
                )
                .await
                .map_err(|e| e.with_context(format!("reading stock of product {}", product_id)))?;

            let mut entry = Map::new();
            entry.insert("name".to_string(), name);
            match stock.get(0) {
                Some(record) => {
                    for field in STOCK_FIELDS {
                        entry.insert(
                            field.to_string(),
                            record.get(*field).cloned().unwrap_or(Value::Null),
                        );
                    }
                }
                None => {
                    entry.insert("error".to_string(), json!("product not found"));
                }
            }
            availability.insert(product_id.to_string(), Value::Object(entry));
        }

        let location = match args.location_id {
            Some(location_id) => {
                let location_fields = ["name".to_string(), "complete_name".to_string()];
                let found = self
                    .client
                    .search_read(
                        "stock.location",
                        json!([["id", "=", location_id]]),
                        Some(&location_fields),
                        &SearchOptions::new(),
                    )
                    .await
                    .map_err(|e| e.with_context(format!("reading location {}", location_id)))?;
                found.get(0).cloned().unwrap_or(Value::Null)
            }
            None => Value::Null,
        };

        Ok(json!({
            "products": availability,
            "location": location,
        }))
    }
}

/// Handler for `create_inventory_adjustment`.
///
/// Servers that still have `stock.inventory` get an inventory with one line
/// per count, validated at the end. Newer servers set `inventory_quantity` on
/// the matching `stock.quant` (creating it when missing) and apply it.
#[derive(Debug)]
pub struct CreateInventoryAdjustmentHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct InventoryAdjustmentArgs {
    name: String,
    adjustment_lines: Vec<AdjustmentLine>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdjustmentLine {
    product_id: i64,
    location_id: i64,
    product_qty: f64,
}

impl CreateInventoryAdjustmentHandler {
    async fn has_inventory_model(&self) -> Result<bool, ToolError> {
        let count = self
            .client
            .invoke(
                "ir.model",
                "search_count",
                vec![json!([["model", "=", "stock.inventory"]])],
                Map::new(),
            )
            .await?;
        Ok(count.as_i64().unwrap_or(0) > 0)
    }

    async fn adjust_inventory(&self, args: &InventoryAdjustmentArgs) -> Result<Value, ToolError> {
        let mut values = Map::new();
        values.insert("name".to_string(), json!(args.name));
        values.insert("line_ids".to_string(), json!([]));
        if let Some(date) = &args.date {
            values.insert("date".to_string(), json!(date));
        }

        let created = self
            .client
            .create("stock.inventory", Value::Object(values))
            .await?;
        let inventory_id = created.as_i64().ok_or_else(|| {
            ToolError::UnexpectedResponse(format!("create returned {}", created))
        })?;

        for line in &args.adjustment_lines {
            self.client
                .create(
                    "stock.inventory.line",
                    json!({
                        "inventory_id": inventory_id,
                        "product_id": line.product_id,
                        "location_id": line.location_id,
                        "product_qty": line.product_qty,
                    }),
                )
                .await
                .map_err(|e| e.with_context(format!("inventory {} was created", inventory_id)))?;
        }

        self.client
            .invoke(
                "stock.inventory",
                "action_validate",
                vec![json!([inventory_id])],
                Map::new(),
            )
            .await
            .map_err(|e| e.with_context(format!("validating inventory {}", inventory_id)))?;
        tracing::info!(inventory_id, "Validated inventory adjustment");

        Ok(json!({
            "inventory_id": inventory_id,
            "name": args.name,
        }))
    }

    async fn adjust_quants(&self, args: &InventoryAdjustmentArgs) -> Result<Value, ToolError> {
        let fields = ["id".to_string(), "quantity".to_string()];
        let mut quant_ids = Vec::with_capacity(args.adjustment_lines.len());

        for line in &args.adjustment_lines {
            let quants = self
                .client
                .search_read(
                    "stock.quant",
                    json!([
                        ["product_id", "=", line.product_id],
                        ["location_id", "=", line.location_id]
                    ]),
                    Some(&fields),
                    &SearchOptions::new(),
                )
                .await?;
            let existing = expect_array(quants, "search_read")?
                .first()
                .and_then(|q| q.get("id"))
                .and_then(Value::as_i64);

            let quant_id = match existing {
                Some(quant_id) => {
                    self.client
                        .write(
                            "stock.quant",
                            &[quant_id],
                            json!({"inventory_quantity": line.product_qty}),
                        )
                        .await?;
                    quant_id
                }
                None => {
                    let created = self
                        .client
                        .create(
                            "stock.quant",
                            json!({
                                "product_id": line.product_id,
                                "location_id": line.location_id,
                                "inventory_quantity": line.product_qty,
                            }),
                        )
                        .await?;
                    created.as_i64().ok_or_else(|| {
                        ToolError::UnexpectedResponse(format!("create returned {}", created))
                    })?
                }
            };
            quant_ids.push(quant_id);
        }

        self.client
            .invoke(
                "stock.quant",
                "action_apply_inventory",
                vec![json!(quant_ids)],
                Map::new(),
            )
            .await
            .map_err(|e| e.with_context(format!("applying quants {:?}", quant_ids)))?;
        tracing::info!(?quant_ids, "Applied inventory quantities");

        Ok(json!({
            "quant_ids": quant_ids,
            "name": args.name,
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for CreateInventoryAdjustmentHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: InventoryAdjustmentArgs = parse_args(args)?;
        if args.adjustment_lines.is_empty() {
            return Err(ToolError::InvalidArguments(
                "'adjustment_lines' must contain at least one line".to_string(),
            ));
        }
        if let Some(date) = &args.date {
            parse_date("date", date)?;
        }

        if self.has_inventory_model().await? {
            self.adjust_inventory(&args).await
        } else {
            self.adjust_quants(&args).await
        }
    }
}

/// Handler for `search_journal_entries`
#[derive(Debug)]
pub struct SearchJournalEntriesHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct JournalEntriesArgs {
    date_from: Option<String>,
    date_to: Option<String>,
    journal_id: Option<i64>,
    state: Option<String>,
    #[serde(default = "default_page_size")]
    limit: u64,
    #[serde(default)]
    offset: u64,
}

const ENTRY_FIELDS: &[&str] = &[
    "name",
    "ref",
    "date",
    "journal_id",
    "state",
    "amount_total",
    "amount_total_signed",
    "line_ids",
];

const LINE_FIELDS: &[&str] = &[
    "name",
    "account_id",
    "partner_id",
    "debit",
    "credit",
    "balance",
];

fn line_ids(entry: &Value) -> Vec<i64> {
    entry
        .get("line_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl ToolHandler for SearchJournalEntriesHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: JournalEntriesArgs = parse_args(args)?;

        let mut domain = Vec::new();
        if let Some(date_from) = &args.date_from {
            parse_date("date_from", date_from)?;
            domain.push(json!(["date", ">=", date_from]));
        }
        if let Some(date_to) = &args.date_to {
            parse_date("date_to", date_to)?;
            domain.push(json!(["date", "<=", date_to]));
        }
        if let Some(journal_id) = args.journal_id {
            domain.push(json!(["journal_id", "=", journal_id]));
        }
        if let Some(state) = &args.state {
            domain.push(json!(["state", "=", state]));
        }
        let domain = Value::Array(domain);

        let fields: Vec<String> = ENTRY_FIELDS.iter().map(|f| f.to_string()).collect();
        let entries = self
            .client
            .search_read(
                "account.move",
                domain.clone(),
                Some(&fields),
                &SearchOptions::new().offset(args.offset).limit(args.limit),
            )
            .await?;
        let mut entries = expect_array(entries, "search_read")?;
        let total_count = self
            .client
            .invoke("account.move", "search_count", vec![domain], Map::new())
            .await?;

        // All lines of the page in one round trip
        let wanted: Vec<i64> = entries.iter().flat_map(line_ids).collect();
        let mut lines_by_id: HashMap<i64, Value> = HashMap::new();
        if !wanted.is_empty() {
            let line_fields: Vec<String> = LINE_FIELDS.iter().map(|f| f.to_string()).collect();
            let lines = self
                .client
                .search_read(
                    "account.move.line",
                    json!([["id", "in", wanted]]),
                    Some(&line_fields),
                    &SearchOptions::new(),
                )
                .await
                .map_err(|e| e.with_context("reading journal items"))?;
            for line in expect_array(lines, "search_read")? {
                if let Some(id) = line.get("id").and_then(Value::as_i64) {
                    lines_by_id.insert(id, line);
                }
            }
        }

        for entry in entries.iter_mut() {
            let ids = line_ids(entry);
            if ids.is_empty() {
                continue;
            }
            let lines: Vec<Value> = ids
                .iter()
                .filter_map(|id| lines_by_id.get(id).cloned())
                .collect();
            if let Some(record) = entry.as_object_mut() {
                record.remove("line_ids");
                record.insert("lines".to_string(), Value::Array(lines));
            }
        }

        Ok(json!({
            "count": entries.len(),
            "total_count": total_count,
            "entries": entries,
        }))
    }
}

/// Handler for `create_journal_entry`
#[derive(Debug)]
pub struct CreateJournalEntryHandler {
    pub client: Arc<OdooClient>,
}

#[derive(Debug, Deserialize)]
struct CreateJournalEntryArgs {
    journal_id: i64,
    lines: Vec<JournalLine>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JournalLine {
    account_id: i64,
    #[serde(default)]
    debit: f64,
    #[serde(default)]
    credit: f64,
    name: Option<String>,
    partner_id: Option<i64>,
}

/// Amount in cents, so totals compare at two decimals
fn cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

impl JournalLine {
    fn command(&self) -> Value {
        let mut values = Map::new();
        values.insert("account_id".to_string(), json!(self.account_id));
        let name = self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("/");
        values.insert("name".to_string(), json!(name));
        values.insert("debit".to_string(), json!(self.debit));
        values.insert("credit".to_string(), json!(self.credit));
        if let Some(partner_id) = self.partner_id.filter(|id| *id != 0) {
            values.insert("partner_id".to_string(), json!(partner_id));
        }
        json!([0, 0, values])
    }
}

#[async_trait::async_trait]
impl ToolHandler for CreateJournalEntryHandler {
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: CreateJournalEntryArgs = parse_args(args)?;
        if args.lines.is_empty() {
            return Err(ToolError::InvalidArguments(
                "'lines' must contain at least one line".to_string(),
            ));
        }

        let total_debit: f64 = args.lines.iter().map(|l| l.debit).sum();
        let total_credit: f64 = args.lines.iter().map(|l| l.credit).sum();
        if cents(total_debit) != cents(total_credit) {
            return Err(ToolError::InvalidArguments(format!(
                "entry is not balanced: debit {:.2}, credit {:.2}",
                total_debit, total_credit
            )));
        }

        let mut values = Map::new();
        values.insert("journal_id".to_string(), json!(args.journal_id));
        values.insert(
            "line_ids".to_string(),
            Value::Array(args.lines.iter().map(JournalLine::command).collect()),
        );
        if let Some(reference) = args.reference.as_deref().filter(|r| !r.is_empty()) {
            values.insert("ref".to_string(), json!(reference));
        }
        if let Some(date) = &args.date {
            parse_date("date", date)?;
            values.insert("date".to_string(), json!(date));
        }

        let created = self
            .client
            .create("account.move", Value::Object(values))
            .await?;
        let move_id = created.as_i64().ok_or_else(|| {
            ToolError::UnexpectedResponse(format!("create returned {}", created))
        })?;
        tracing::info!(move_id, "Created journal entry");

        let fields = ["name".to_string(), "state".to_string()];
        let records = self
            .client
            .read("account.move", &[move_id], Some(&fields))
            .await
            .map_err(|e| e.with_context(format!("journal entry {} was created", move_id)))?;
        let record = records.get(0).ok_or_else(|| {
            ToolError::UnexpectedResponse(format!(
                "journal entry {} was created but could not be read back",
                move_id
            ))
        })?;

        Ok(json!({
            "move_id": move_id,
            "name": record.get("name").cloned().unwrap_or(Value::Null),
            "state": record.get("state").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odoo::mock::{test_config, MockTransport};
    use crate::odoo::GatewayError;

    fn setup() -> (Arc<MockTransport>, Arc<OdooClient>) {
        let mock = Arc::new(MockTransport::new());
        let client = Arc::new(OdooClient::with_transport(test_config(), mock.clone()));
        (mock, client)
    }

    #[test]
    fn test_order_kind_fields() {
        assert_eq!(OrderKind::Sale.fields().len(), 8);
        let purchase = OrderKind::Purchase.fields();
        assert!(purchase.contains(&"date_planned".to_string()));
        assert!(purchase.contains(&"date_approve".to_string()));
        assert_eq!(OrderKind::Purchase.model(), "purchase.order");
    }

    #[tokio::test]
    async fn test_search_orders_builds_domain_and_counts() {
        let (mock, client) = setup();
        mock.reply("sale.order", "search_read", json!([{"id": 1, "name": "S00001"}]));
        mock.reply("sale.order", "search_count", json!(37));
        let handler = SearchOrdersHandler {
            client,
            kind: OrderKind::Sale,
        };

        let result = handler
            .execute(json!({
                "partner_id": 8,
                "date_from": "2024-01-01",
                "state": "sale",
                "order": "date_order desc"
            }))
            .await
            .unwrap();

        assert_eq!(result["count"], 1);
        assert_eq!(result["total_count"], 37);
        assert_eq!(result["orders"][0]["name"], "S00001");

        let search = &mock.calls_to("sale.order", "search_read")[0];
        let expected_domain = json!([
            ["partner_id", "=", 8],
            ["date_order", ">=", "2024-01-01"],
            ["state", "=", "sale"]
        ]);
        assert_eq!(search.args[0], expected_domain);
        assert_eq!(search.kwargs.get("limit"), Some(&json!(20)));
        assert_eq!(search.kwargs.get("order"), Some(&json!("date_order desc")));
        assert_eq!(
            mock.calls_to("sale.order", "search_count")[0].args[0],
            expected_domain
        );
    }

    #[tokio::test]
    async fn test_search_orders_rejects_bad_date() {
        let (mock, client) = setup();
        let handler = SearchOrdersHandler {
            client,
            kind: OrderKind::Purchase,
        };

        let err = handler
            .execute(json!({"date_to": "31-12-2024"}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_arguments");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_purchase_order_line_commands() {
        let (mock, client) = setup();
        mock.reply("purchase.order", "create", json!(15));
        mock.reply("purchase.order", "read", json!([{"id": 15, "name": "P00015"}]));
        let handler = CreateOrderHandler {
            client,
            kind: OrderKind::Purchase,
        };

        let result = handler
            .execute(json!({
                "partner_id": 3,
                "order_lines": [
                    {"product_id": 7, "product_qty": 4, "price_unit": 12.5},
                    {"product_id": 9, "product_qty": 1}
                ],
                "date_order": "2024-05-02"
            }))
            .await
            .unwrap();

        assert_eq!(result, json!({"order_id": 15, "order_name": "P00015"}));
        let create = &mock.calls_to("purchase.order", "create")[0];
        assert_eq!(
            create.args[0],
            json!({
                "partner_id": 3,
                "order_line": [
                    [0, 0, {"product_id": 7, "product_qty": 4.0, "price_unit": 12.5}],
                    [0, 0, {"product_id": 9, "product_qty": 1.0}]
                ],
                "date_order": "2024-05-02"
            })
        );
    }

    #[tokio::test]
    async fn test_create_order_without_read_back() {
        let (mock, client) = setup();
        mock.reply("sale.order", "create", json!(21));
        mock.reply("sale.order", "read", json!([]));
        let handler = CreateOrderHandler {
            client,
            kind: OrderKind::Sale,
        };

        let err = handler
            .execute(json!({
                "partner_id": 3,
                "order_lines": [{"product_id": 7, "product_uom_qty": 2}]
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::UnexpectedResponse(ref m) if m.contains("order 21")));
    }

    #[tokio::test]
    async fn test_create_sales_order_requires_quantity() {
        let (mock, client) = setup();
        let handler = CreateOrderHandler {
            client,
            kind: OrderKind::Sale,
        };

        // product_qty belongs to purchase lines
        let err = handler
            .execute(json!({
                "partner_id": 3,
                "order_lines": [{"product_id": 7, "product_qty": 4}]
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("product_uom_qty")));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_availability_with_location() {
        let (mock, client) = setup();
        mock.reply(
            "product.product",
            "search_read",
            json!([{"id": 5, "name": "Desk", "default_code": "D1", "type": "product", "uom_id": [1, "Units"]}]),
        );
        mock.reply(
            "product.product",
            "read",
            json!([{"id": 5, "qty_available": 12.0, "virtual_available": 10.0, "incoming_qty": 0.0, "outgoing_qty": 2.0}]),
        );
        mock.reply(
            "stock.location",
            "search_read",
            json!([{"id": 8, "name": "Stock", "complete_name": "WH/Stock"}]),
        );
        let handler = CheckProductAvailabilityHandler { client };

        let result = handler
            .execute(json!({"product_ids": [5], "location_id": 8}))
            .await
            .unwrap();

        assert_eq!(
            result["products"]["5"],
            json!({
                "name": "Desk",
                "qty_available": 12.0,
                "virtual_available": 10.0,
                "incoming_qty": 0.0,
                "outgoing_qty": 2.0
            })
        );
        assert_eq!(result["location"]["complete_name"], "WH/Stock");

        let read = &mock.calls_to("product.product", "read")[0];
        assert_eq!(read.kwargs.get("context"), Some(&json!({"location": 8})));
    }

    #[tokio::test]
    async fn test_availability_no_products() {
        let (mock, client) = setup();
        mock.reply("product.product", "search_read", json!([]));
        let handler = CheckProductAvailabilityHandler { client };

        let err = handler
            .execute(json!({"product_ids": [404]}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_availability_propagates_read_errors() {
        let (mock, client) = setup();
        mock.reply("product.product", "search_read", json!([{"id": 5, "name": "Desk"}]));
        mock.fail(
            "product.product",
            "read",
            GatewayError::RemoteExecution("stock module not installed".to_string()),
        );
        let handler = CheckProductAvailabilityHandler { client };

        let err = handler.execute(json!({"product_ids": [5]})).await.unwrap_err();
        match err {
            ToolError::Gateway(GatewayError::RemoteExecution(message)) => {
                assert!(message.contains("product 5"));
                assert!(message.contains("stock module not installed"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_journal_entries_expand_lines() {
        let (mock, client) = setup();
        mock.reply(
            "account.move",
            "search_read",
            json!([
                {"id": 1, "name": "INV/1", "line_ids": [10, 11]},
                {"id": 2, "name": "MISC/1", "line_ids": []}
            ]),
        );
        mock.reply("account.move", "search_count", json!(2));
        mock.reply(
            "account.move.line",
            "search_read",
            json!([
                {"id": 11, "name": "Tax", "debit": 0.0, "credit": 21.0},
                {"id": 10, "name": "Product", "debit": 121.0, "credit": 0.0}
            ]),
        );
        let handler = SearchJournalEntriesHandler { client };

        let result = handler
            .execute(json!({"state": "posted", "journal_id": 1}))
            .await
            .unwrap();

        assert_eq!(result["count"], 2);
        assert_eq!(result["entries"][0]["lines"][0]["id"], 10);
        assert_eq!(result["entries"][0]["lines"][1]["id"], 11);
        assert!(result["entries"][0].get("line_ids").is_none());
        assert_eq!(result["entries"][1]["line_ids"], json!([]));

        let lines = mock.calls_to("account.move.line", "search_read");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].args[0], json!([["id", "in", [10, 11]]]));
    }

    #[tokio::test]
    async fn test_unbalanced_journal_entry_is_rejected_before_any_call() {
        let (mock, client) = setup();
        let handler = CreateJournalEntryHandler { client };

        let err = handler
            .execute(json!({
                "journal_id": 3,
                "lines": [
                    {"account_id": 10, "debit": 100.0},
                    {"account_id": 20, "credit": 99.99}
                ]
            }))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_arguments");
        assert!(err.to_string().contains("not balanced"));
        assert!(mock.calls().is_empty());
        assert_eq!(mock.handshake_count(), 0);
    }

    #[tokio::test]
    async fn test_create_journal_entry() {
        let (mock, client) = setup();
        mock.reply("account.move", "create", json!(88));
        mock.reply(
            "account.move",
            "read",
            json!([{"id": 88, "name": "MISC/2024/0007", "state": "draft"}]),
        );
        let handler = CreateJournalEntryHandler { client };

        // 0.1 + 0.2 only balances 0.3 at two decimals
        let result = handler
            .execute(json!({
                "journal_id": 3,
                "ref": "Accrual",
                "date": "2024-06-30",
                "lines": [
                    {"account_id": 10, "debit": 0.1, "name": "Rent", "partner_id": 5},
                    {"account_id": 10, "debit": 0.2},
                    {"account_id": 20, "credit": 0.3}
                ]
            }))
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({"move_id": 88, "name": "MISC/2024/0007", "state": "draft"})
        );
        let create = &mock.calls_to("account.move", "create")[0];
        assert_eq!(
            create.args[0],
            json!({
                "journal_id": 3,
                "ref": "Accrual",
                "date": "2024-06-30",
                "line_ids": [
                    [0, 0, {"account_id": 10, "name": "Rent", "debit": 0.1, "credit": 0.0, "partner_id": 5}],
                    [0, 0, {"account_id": 10, "name": "/", "debit": 0.2, "credit": 0.0}],
                    [0, 0, {"account_id": 20, "name": "/", "debit": 0.0, "credit": 0.3}]
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_journal_entry_line_needs_account() {
        let (mock, client) = setup();
        let handler = CreateJournalEntryHandler { client };

        let err = handler
            .execute(json!({"journal_id": 3, "lines": [{"debit": 1.0}]}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_arguments");
        assert!(mock.calls().is_empty());
    }

    fn adjustment() -> Value {
        json!({
            "name": "Cycle count",
            "adjustment_lines": [{"product_id": 7, "location_id": 8, "product_qty": 12.0}]
        })
    }

    #[tokio::test]
    async fn test_adjustment_updates_existing_quant() {
        let (mock, client) = setup();
        mock.reply("ir.model", "search_count", json!(0));
        mock.reply("stock.quant", "search_read", json!([{"id": 40, "quantity": 3.0}]));
        mock.reply("stock.quant", "write", json!(true));
        mock.reply("stock.quant", "action_apply_inventory", json!(true));
        let handler = CreateInventoryAdjustmentHandler { client };

        let result = handler.execute(adjustment()).await.unwrap();

        assert_eq!(result, json!({"quant_ids": [40], "name": "Cycle count"}));
        let write = &mock.calls_to("stock.quant", "write")[0];
        assert_eq!(write.args, vec![json!([40]), json!({"inventory_quantity": 12.0})]);
        assert!(mock.calls_to("stock.quant", "create").is_empty());
        let lookup = &mock.calls_to("stock.quant", "search_read")[0];
        assert_eq!(
            lookup.args[0],
            json!([["product_id", "=", 7], ["location_id", "=", 8]])
        );
        let apply = &mock.calls_to("stock.quant", "action_apply_inventory")[0];
        assert_eq!(apply.args, vec![json!([40])]);
    }

    #[tokio::test]
    async fn test_adjustment_creates_missing_quant() {
        let (mock, client) = setup();
        mock.reply("ir.model", "search_count", json!(0));
        mock.reply("stock.quant", "search_read", json!([]));
        mock.reply("stock.quant", "create", json!(41));
        mock.reply("stock.quant", "action_apply_inventory", json!(true));
        let handler = CreateInventoryAdjustmentHandler { client };

        let result = handler.execute(adjustment()).await.unwrap();

        assert_eq!(result, json!({"quant_ids": [41], "name": "Cycle count"}));
        assert!(mock.calls_to("stock.quant", "write").is_empty());
        let create = &mock.calls_to("stock.quant", "create")[0];
        assert_eq!(
            create.args[0],
            json!({"product_id": 7, "location_id": 8, "inventory_quantity": 12.0})
        );
        let apply = &mock.calls_to("stock.quant", "action_apply_inventory")[0];
        assert_eq!(apply.args, vec![json!([41])]);
    }

    #[tokio::test]
    async fn test_adjustment_with_inventory_model() {
        let (mock, client) = setup();
        mock.reply("ir.model", "search_count", json!(1));
        mock.reply("stock.inventory", "create", json!(5));
        mock.reply("stock.inventory.line", "create", json!(50));
        mock.reply("stock.inventory", "action_validate", json!(true));
        let handler = CreateInventoryAdjustmentHandler { client };

        let mut args = adjustment();
        args["date"] = json!("2024-07-01");
        let result = handler.execute(args).await.unwrap();

        assert_eq!(result, json!({"inventory_id": 5, "name": "Cycle count"}));
        let inventory = &mock.calls_to("stock.inventory", "create")[0];
        assert_eq!(
            inventory.args[0],
            json!({"name": "Cycle count", "line_ids": [], "date": "2024-07-01"})
        );
        let line = &mock.calls_to("stock.inventory.line", "create")[0];
        assert_eq!(
            line.args[0],
            json!({"inventory_id": 5, "product_id": 7, "location_id": 8, "product_qty": 12.0})
        );
        let validate = &mock.calls_to("stock.inventory", "action_validate")[0];
        assert_eq!(validate.args, vec![json!([5])]);
        assert!(mock.calls_to("stock.quant", "search_read").is_empty());
    }

    #[tokio::test]
    async fn test_adjustment_rejects_bad_date_before_any_call() {
        let (mock, client) = setup();
        let handler = CreateInventoryAdjustmentHandler { client };

        let mut args = adjustment();
        args["date"] = json!("07/01/2024");
        let err = handler.execute(args).await.unwrap_err();

        assert_eq!(err.kind(), "invalid_arguments");
        assert!(mock.calls().is_empty());
    }
}
