//! The Odoo gateway: session handling and the uniform `invoke` entry point.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{GatewayError, HttpTransport, RpcTransport, Service};
use crate::config::OdooConfig;

/// An authenticated identity on the Odoo server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Numeric user id returned by `authenticate`
    pub uid: i64,
}

/// Paging and ordering for `search` and `search_read`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub offset: u64,
    pub limit: Option<u64>,
    pub order: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Keyword arguments for the call; defaults are left out so the server
    /// applies its own.
    fn apply(&self, kwargs: &mut Map<String, Value>) {
        if self.offset > 0 {
            kwargs.insert("offset".to_string(), json!(self.offset));
        }
        if let Some(limit) = self.limit {
            kwargs.insert("limit".to_string(), json!(limit));
        }
        if let Some(order) = &self.order {
            kwargs.insert("order".to_string(), json!(order));
        }
    }
}

/// Gateway to one Odoo database.
///
/// Construct once at startup and share through an `Arc`. The session is
/// established lazily; concurrent first calls wait on the same handshake.
#[derive(Debug)]
pub struct OdooClient {
    config: OdooConfig,
    transport: Arc<dyn RpcTransport>,
    session: Mutex<Option<Session>>,
}

impl OdooClient {
    /// Create a gateway talking XML-RPC over HTTP
    pub fn new(config: OdooConfig) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a gateway over a custom transport (used by tests)
    pub fn with_transport(config: OdooConfig, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            config,
            transport,
            session: Mutex::new(None),
        }
    }

    /// Connection profile this gateway was built with
    pub fn config(&self) -> &OdooConfig {
        &self.config
    }

    /// The cached session, if the handshake has happened
    pub async fn session(&self) -> Option<Session> {
        *self.session.lock().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session().await.is_some()
    }

    /// Authenticate if needed and return the session.
    ///
    /// The lock is held across the handshake so at most one authentication
    /// request is in flight. A failed attempt leaves the gateway
    /// unauthenticated and the next call tries again.
    pub async fn connect(&self) -> Result<Session, GatewayError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = *guard {
            return Ok(session);
        }

        let session = self.authenticate().await?;
        *guard = Some(session);
        Ok(session)
    }

    /// Drop the cached session and authenticate again, e.g. after the
    /// password was rotated on the server.
    pub async fn reconnect(&self) -> Result<Session, GatewayError> {
        let mut guard = self.session.lock().await;
        *guard = None;

        let session = self.authenticate().await?;
        *guard = Some(session);
        Ok(session)
    }

    async fn authenticate(&self) -> Result<Session, GatewayError> {
        tracing::info!(
            url = %self.config.url,
            database = %self.config.database,
            username = %self.config.username,
            "Authenticating with Odoo"
        );

        let params = vec![
            json!(self.config.database),
            json!(self.config.username),
            json!(self.config.password),
            json!({}),
        ];
        let reply = self
            .timed(self.transport.call(Service::Common, "authenticate", params))
            .await
            .inspect_err(|e| tracing::warn!("Odoo handshake failed: {}", e))?;

        match reply.as_i64() {
            Some(uid) if uid > 0 => {
                tracing::info!(uid, "Authenticated with Odoo");
                Ok(Session { uid })
            }
            _ => {
                tracing::warn!(username = %self.config.username, "Odoo rejected credentials");
                Err(GatewayError::Authentication(format!(
                    "credentials for '{}' were rejected by database '{}'",
                    self.config.username, self.config.database
                )))
            }
        }
    }

    /// Server version information (`common.version`), no login required
    pub async fn server_version(&self) -> Result<Value, GatewayError> {
        self.timed(self.transport.call(Service::Common, "version", Vec::new()))
            .await
    }

    /// Execute `method` on `model` with positional and keyword arguments.
    ///
    /// The result is returned exactly as the server sent it.
    pub async fn invoke(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let session = self.connect().await?;
        tracing::debug!(model, method, "execute_kw");

        let params = vec![
            json!(self.config.database),
            json!(session.uid),
            json!(self.config.password),
            json!(model),
            json!(method),
            Value::Array(args),
            Value::Object(kwargs),
        ];

        self.timed(self.transport.call(Service::Object, "execute_kw", params))
            .await
            .inspect_err(|e| tracing::warn!(model, method, "Odoo call failed: {}", e))
    }

    /// Bound a transport call by the configured timeout
    async fn timed<F>(&self, call: F) -> Result<Value, GatewayError>
    where
        F: Future<Output = Result<Value, GatewayError>>,
    {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| {
                GatewayError::Connectivity(format!(
                    "no response from {} within {}s",
                    self.config.url,
                    timeout.as_secs_f64()
                ))
            })?
    }

    // ========== CONVENIENCE WRAPPERS ==========

    /// Ids of records matching `domain`
    pub async fn search(
        &self,
        model: &str,
        domain: Value,
        options: &SearchOptions,
    ) -> Result<Value, GatewayError> {
        let mut kwargs = Map::new();
        options.apply(&mut kwargs);
        self.invoke(model, "search", vec![domain], kwargs).await
    }

    /// Read `fields` (all fields when `None`) of the records `ids`
    pub async fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: Option<&[String]>,
    ) -> Result<Value, GatewayError> {
        let mut kwargs = Map::new();
        if let Some(fields) = fields {
            kwargs.insert("fields".to_string(), json!(fields));
        }
        self.invoke(model, "read", vec![json!(ids)], kwargs).await
    }

    /// Search and read in one round trip
    pub async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: Option<&[String]>,
        options: &SearchOptions,
    ) -> Result<Value, GatewayError> {
        let mut kwargs = Map::new();
        if let Some(fields) = fields {
            kwargs.insert("fields".to_string(), json!(fields));
        }
        options.apply(&mut kwargs);
        self.invoke(model, "search_read", vec![domain], kwargs).await
    }

    /// Create a record, returning its id
    pub async fn create(&self, model: &str, values: Value) -> Result<Value, GatewayError> {
        self.invoke(model, "create", vec![values], Map::new()).await
    }

    /// Update the records `ids` with `values`
    pub async fn write(&self, model: &str, ids: &[i64], values: Value) -> Result<Value, GatewayError> {
        self.invoke(model, "write", vec![json!(ids), values], Map::new())
            .await
    }

    /// Delete the records `ids`
    pub async fn unlink(&self, model: &str, ids: &[i64]) -> Result<Value, GatewayError> {
        self.invoke(model, "unlink", vec![json!(ids)], Map::new()).await
    }

    /// Models installed on the server, as returned by `ir.model`
    pub async fn list_models(&self) -> Result<Value, GatewayError> {
        let mut kwargs = Map::new();
        kwargs.insert("fields".to_string(), json!(["model", "name"]));
        self.invoke("ir.model", "search_read", vec![json!([])], kwargs)
            .await
    }
}
