//! Mock transport for testing purposes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{GatewayError, RpcTransport, Service};
use crate::config::OdooConfig;

/// One `execute_kw` call as seen by the server
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub uid: i64,
    pub model: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

/// A scriptable stand-in for an Odoo server.
///
/// Accepts any credentials with uid 2 until told otherwise, answers
/// `execute_kw` from replies registered per `(model, method)`, and records
/// every call it receives.
#[derive(Debug)]
pub struct MockTransport {
    uid: Mutex<Option<i64>>,
    delay: Mutex<Option<Duration>>,
    replies: Mutex<HashMap<(String, String), Result<Value, GatewayError>>>,
    default_reply: Mutex<Option<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
    handshakes: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a mock that authenticates everyone as uid 2
    pub fn new() -> Self {
        Self {
            uid: Mutex::new(Some(2)),
            delay: Mutex::new(None),
            replies: Mutex::new(HashMap::new()),
            default_reply: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            handshakes: AtomicUsize::new(0),
        }
    }

    /// Uid returned by `authenticate`; `None` rejects the credentials
    pub fn set_uid(&self, uid: Option<i64>) {
        *lock(&self.uid) = uid;
    }

    /// Delay applied to every call before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Answer `model.method` with `value`
    pub fn reply(&self, model: &str, method: &str, value: Value) {
        lock(&self.replies).insert((model.to_string(), method.to_string()), Ok(value));
    }

    /// Answer `model.method` with an error
    pub fn fail(&self, model: &str, method: &str, error: GatewayError) {
        lock(&self.replies).insert((model.to_string(), method.to_string()), Err(error));
    }

    /// Reply for calls without a registered answer; `None` makes them fail
    pub fn set_default_reply(&self, value: Option<Value>) {
        *lock(&self.default_reply) = value;
    }

    /// Calls received on the object endpoint, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Calls to `model.method` only
    pub fn calls_to(&self, model: &str, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.model == model && c.method == method)
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Number of `authenticate` requests received
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    fn execute_kw(&self, params: Vec<Value>) -> Result<Value, GatewayError> {
        let mut params = params.into_iter();
        let _database = params.next();
        let uid = params.next().and_then(|v| v.as_i64()).unwrap_or_default();
        let _password = params.next();
        let model = params.next().and_then(|v| v.as_str().map(String::from));
        let method = params.next().and_then(|v| v.as_str().map(String::from));
        let args = match params.next() {
            Some(Value::Array(args)) => args,
            _ => Vec::new(),
        };
        let kwargs = match params.next() {
            Some(Value::Object(kwargs)) => kwargs,
            _ => Map::new(),
        };

        let (Some(model), Some(method)) = (model, method) else {
            return Err(GatewayError::InvalidRequest(
                "execute_kw needs a model and a method".to_string(),
            ));
        };

        lock(&self.calls).push(RecordedCall {
            uid,
            model: model.clone(),
            method: method.clone(),
            args,
            kwargs,
        });

        if let Some(reply) = lock(&self.replies).get(&(model.clone(), method.clone())) {
            return reply.clone();
        }

        lock(&self.default_reply).clone().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("no reply scripted for {}.{}", model, method))
        })
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(
        &self,
        service: Service,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, GatewayError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match (service, method) {
            (Service::Common, "authenticate") => {
                self.handshakes.fetch_add(1, Ordering::SeqCst);
                Ok(match *lock(&self.uid) {
                    Some(uid) => json!(uid),
                    None => Value::Bool(false),
                })
            }
            (Service::Common, "version") => Ok(json!({
                "server_version": "17.0",
                "server_version_info": [17, 0, 0, "final", 0, ""],
                "server_serie": "17.0",
                "protocol_version": 1
            })),
            (Service::Object, "execute_kw") => self.execute_kw(params),
            (service, method) => Err(GatewayError::InvalidRequest(format!(
                "method '{}' not available on {}",
                method,
                service.path()
            ))),
        }
    }
}

/// Connection profile pointing nowhere, for tests
pub fn test_config() -> OdooConfig {
    OdooConfig {
        url: "http://odoo.test".to_string(),
        database: "test".to_string(),
        username: "admin".to_string(),
        password: "admin".to_string(),
        timeout: Duration::from_secs(5),
        verify_ssl: false,
    }
}
