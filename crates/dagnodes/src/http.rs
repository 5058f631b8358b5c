use async_trait::async_trait;
use dagcore::{HandlerMetadata, NodeAction, NodeContext, NodeError, NodeHandler, NodeSpec};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// A fully rendered request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Strings are sent as-is, anything else as JSON
    pub body: Option<Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Capability the HTTP node performs requests through
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// Transport backed by a shared `reqwest` client
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| NodeError::Configuration(format!("Unsupported method: {}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        builder = match request.body {
            Some(Value::String(text)) => builder.body(text),
            Some(json) => builder.json(&json),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Timeout {
                    seconds: request.timeout.as_secs(),
                }
            } else {
                NodeError::ExecutionFailed(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// HTTP request node
pub struct HttpRequestNode {
    transport: Arc<dyn HttpTransport>,
    default_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct HttpRecord {
    url: String,
    method: String,
    status: u16,
    content_type: Option<String>,
    body: Value,
}

impl HttpRequestNode {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            default_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()))
    }
}

#[async_trait]
impl NodeHandler for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http"
    }

    fn validate(&self, spec: &NodeSpec) -> Result<(), NodeError> {
        let NodeAction::Http(params) = &spec.action else {
            return Err(NodeError::Configuration(format!(
                "node '{}' is not an http node",
                spec.id
            )));
        };
        if params.url.trim().is_empty() {
            return Err(NodeError::Configuration(format!(
                "http node '{}' has no url",
                spec.id
            )));
        }
        let method = params.method.to_uppercase();
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            return Err(NodeError::Configuration(format!(
                "Unsupported method: {}",
                params.method
            )));
        }
        Ok(())
    }

    async fn execute(&self, ctx: NodeContext<'_>) -> Result<Value, NodeError> {
        let NodeAction::Http(params) = ctx.action() else {
            return Err(ctx.unexpected_action("http"));
        };

        let url = ctx.render(&params.url)?;
        let method = params.method.to_uppercase();
        let mut headers = BTreeMap::new();
        for (key, value) in &params.headers {
            headers.insert(key.clone(), ctx.render(value)?);
        }
        let body = params
            .body
            .as_ref()
            .map(|b| ctx.render_value(b))
            .transpose()?;
        let timeout = params
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        ctx.events.info(format!("{} {}", method, url));
        tracing::debug!("[{}] {} {}", ctx.node_id(), method, url);

        let response = self
            .transport
            .send(HttpRequest {
                method: method.clone(),
                url: url.clone(),
                headers,
                body,
                timeout,
            })
            .await?;

        ctx.events.info(format!("Response status: {}", response.status));

        if !(200..300).contains(&response.status) {
            return Err(NodeError::HttpStatus {
                status: response.status,
                url,
            });
        }

        let body = parse_body(&url, response.content_type.as_deref(), response.body)?;

        let record = HttpRecord {
            url,
            method,
            status: response.status,
            content_type: response.content_type,
            body,
        };
        serde_json::to_value(record)
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to encode result: {}", e)))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
        }
    }
}

/// JSON when the content type says so, raw text otherwise. A body that
/// claims to be JSON but does not parse is an error.
fn parse_body(url: &str, content_type: Option<&str>, body: String) -> Result<Value, NodeError> {
    if !content_type.is_some_and(is_json) {
        return Ok(Value::String(body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| {
        NodeError::ExecutionFailed(format!(
            "Response from {} declared JSON but could not be parsed: {}",
            url, e
        ))
    })
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
