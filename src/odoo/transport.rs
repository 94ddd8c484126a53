//! HTTP transport for XML-RPC calls.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::xmlrpc::{self, MethodResponse};
use super::{GatewayError, RpcTransport, Service};
use crate::config::OdooConfig;

/// XML-RPC over HTTP(S) using a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the configured server
    pub fn new(config: &OdooConfig) -> Result<Self, GatewayError> {
        Self::with_user_agent(
            config,
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Create a transport with a custom user agent
    pub fn with_user_agent(config: &OdooConfig, user_agent: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| GatewayError::Connectivity(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, service: Service) -> String {
        format!("{}{}", self.base_url, service.path())
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        service: Service,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, GatewayError> {
        let url = self.endpoint(service);
        let body = xmlrpc::encode_call(method, &params);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        // Faults normally arrive with 200, but some proxies rewrite the status
        match (status.is_success(), xmlrpc::decode_response(&text)) {
            (_, Ok(MethodResponse::Fault(fault))) => Err(GatewayError::from_fault(&fault)),
            (true, Ok(MethodResponse::Success(value))) => Ok(value),
            (true, Err(e)) => Err(e.into()),
            (false, _) => Err(GatewayError::Connectivity(format!(
                "{} returned HTTP {}",
                url, status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_for(url: &str) -> OdooConfig {
        OdooConfig {
            url: url.to_string(),
            database: "test".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            timeout: Duration::from_secs(5),
            verify_ssl: false,
        }
    }

    #[tokio::test]
    async fn test_call_posts_xml_to_service_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/xmlrpc/2/common")
            .match_header("content-type", "text/xml")
            .match_body(mockito::Matcher::Regex(
                "<methodName>version</methodName>".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(
                "<?xml version='1.0'?><methodResponse><params><param><value><struct>\
                 <member><name>server_version</name><value><string>17.0</string></value></member>\
                 </struct></value></param></params></methodResponse>",
            )
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server.url())).unwrap();
        let value = transport.call(Service::Common, "version", vec![]).await.unwrap();

        assert_eq!(value, json!({"server_version": "17.0"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fault_maps_to_gateway_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/xmlrpc/2/object")
            .with_status(200)
            .with_body(
                "<methodResponse><fault><value><struct>\
                 <member><name>faultCode</name><value><int>2</int></value></member>\
                 <member><name>faultString</name><value><string>Traceback\nValueError: Expected singleton: res.partner(1, 2)</string></value></member>\
                 </struct></value></fault></methodResponse>",
            )
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server.url())).unwrap();
        let err = transport
            .call(Service::Object, "execute_kw", vec![])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            GatewayError::RemoteExecution("ValueError: Expected singleton: res.partner(1, 2)".to_string())
        );
    }

    #[tokio::test]
    async fn test_http_error_is_connectivity() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/xmlrpc/2/object")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&config_for(&server.url())).unwrap();
        let err = transport
            .call(Service::Object, "execute_kw", vec![])
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connectivity() {
        // Port 9 (discard) is essentially never listening on loopback
        let transport = HttpTransport::new(&config_for("http://127.0.0.1:9")).unwrap();
        let err = transport
            .call(Service::Common, "version", vec![])
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Connectivity(_)));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let transport = HttpTransport::new(&config_for("https://erp.example.com/")).unwrap();
        assert_eq!(
            transport.endpoint(Service::Object),
            "https://erp.example.com/xmlrpc/2/object"
        );
    }
}
