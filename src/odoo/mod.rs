//! Gateway to an Odoo server over XML-RPC.
//!
//! [`OdooClient`] is the single channel every tool and resource goes through.
//! It authenticates once against `/xmlrpc/2/common`, caches the resulting
//! session, and forwards `(model, method, args, kwargs)` calls to
//! `/xmlrpc/2/object` via `execute_kw`.
//!
//! The wire is abstracted behind [`RpcTransport`] so the gateway can be driven
//! by [`HttpTransport`] in production and [`MockTransport`] in tests.

mod client;
pub mod mock;
mod transport;
pub mod xmlrpc;

pub use client::{OdooClient, SearchOptions, Session};
pub use mock::MockTransport;
pub use transport::HttpTransport;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// XML-RPC endpoints exposed by an Odoo server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Login and version information
    Common,
    /// Model method execution
    Object,
}

impl Service {
    /// Path of the endpoint relative to the server URL
    pub fn path(&self) -> &'static str {
        match self {
            Service::Common => "/xmlrpc/2/common",
            Service::Object => "/xmlrpc/2/object",
        }
    }
}

/// Carries one XML-RPC call to the server and back.
#[async_trait]
pub trait RpcTransport: Send + Sync + std::fmt::Debug {
    /// Call `method` on `service` with positional `params`
    async fn call(
        &self,
        service: Service,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, GatewayError>;
}

/// Machine-readable error category, used in structured error payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectivityError,
    AuthenticationError,
    InvalidRequestError,
    RemoteExecutionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectivityError => "connectivity_error",
            ErrorKind::AuthenticationError => "authentication_error",
            ErrorKind::InvalidRequestError => "invalid_request_error",
            ErrorKind::RemoteExecutionError => "remote_execution_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the gateway
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Endpoint unreachable, DNS failure, timeout, or a non XML-RPC answer
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Credentials rejected during the handshake
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server rejected the model, method or argument shape
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The method ran and raised a business-logic fault
    #[error("Remote execution error: {0}")]
    RemoteExecution(String),
}

/// Fault text fragments that point at a malformed call rather than a failed one
const INVALID_REQUEST_MARKERS: &[&str] = &[
    "doesn't exist",
    "does not exist",
    "has no attribute",
    "AttributeError",
    "TypeError",
    "KeyError",
    "Invalid field",
    "unexpected keyword argument",
    "missing 1 required positional argument",
    "is not a valid method",
    "Private methods",
];

const ACCESS_DENIED_MARKERS: &[&str] = &["AccessDenied", "Access Denied", "Access denied"];

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Connectivity(_) => ErrorKind::ConnectivityError,
            GatewayError::Authentication(_) => ErrorKind::AuthenticationError,
            GatewayError::InvalidRequest(_) => ErrorKind::InvalidRequestError,
            GatewayError::RemoteExecution(_) => ErrorKind::RemoteExecutionError,
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Connectivity(m)
            | GatewayError::Authentication(m)
            | GatewayError::InvalidRequest(m)
            | GatewayError::RemoteExecution(m) => m,
        }
    }

    /// Prefix the message with caller context, keeping the kind
    pub fn with_context(self, context: impl std::fmt::Display) -> Self {
        let wrap = |m: String| format!("{}: {}", context, m);
        match self {
            GatewayError::Connectivity(m) => GatewayError::Connectivity(wrap(m)),
            GatewayError::Authentication(m) => GatewayError::Authentication(wrap(m)),
            GatewayError::InvalidRequest(m) => GatewayError::InvalidRequest(wrap(m)),
            GatewayError::RemoteExecution(m) => GatewayError::RemoteExecution(wrap(m)),
        }
    }

    /// Classify an XML-RPC fault.
    pub fn from_fault(fault: &xmlrpc::Fault) -> Self {
        // Chained tracebacks mention earlier exceptions; only the raised one counts
        let summary = fault_summary(&fault.message);
        let text = format!("{} {}", fault.code, summary);

        if ACCESS_DENIED_MARKERS.iter().any(|m| text.contains(m)) {
            GatewayError::Authentication(summary)
        } else if INVALID_REQUEST_MARKERS.iter().any(|m| text.contains(m)) {
            GatewayError::InvalidRequest(summary)
        } else {
            GatewayError::RemoteExecution(summary)
        }
    }
}

/// Last non-empty line of a fault string; Odoo appends the exception message
/// after the traceback.
fn fault_summary(message: &str) -> String {
    message
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("remote fault without message")
        .to_string()
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Connectivity(format!("request timed out: {}", err))
        } else {
            GatewayError::Connectivity(err.to_string())
        }
    }
}

impl From<xmlrpc::ParseError> for GatewayError {
    fn from(err: xmlrpc::ParseError) -> Self {
        GatewayError::Connectivity(err.to_string())
    }
}
