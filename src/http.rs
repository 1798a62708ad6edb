use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Result, ScreepsError};

#[derive(Debug, Clone)]
pub struct ScreepsRequest {
    pub base_url: String,
    pub endpoint: String,
    pub method: Method,
    pub token: Option<String>,
    pub username: Option<String>,
    pub query: Option<HashMap<String, Value>>,
    pub body: Option<Value>,
}

impl ScreepsRequest {
    pub fn get(base_url: &str, endpoint: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            endpoint: endpoint.to_string(),
            method: Method::GET,
            token: None,
            username: None,
            query: None,
            body: None,
        }
    }

    pub fn post(base_url: &str, endpoint: &str, body: Value) -> Self {
        Self { method: Method::POST, body: Some(body), ..Self::get(base_url, endpoint) }
    }

    pub fn with_query(mut self, query: HashMap<String, Value>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_auth(mut self, token: Option<&str>, username: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self.username = username.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScreepsResponse {
    pub status: u16,
    pub ok: bool,
    pub data: Value,
    pub url: String,
}

impl ScreepsResponse {
    /// Server-reported error message from the body, if any.
    pub fn payload_error(&self) -> Option<&str> {
        self.data.get("error").and_then(Value::as_str)
    }
}

static HTTP_CLIENT: OnceLock<std::result::Result<Client, String>> = OnceLock::new();

pub(crate) fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{}", endpoint)
    }
}

/// Builds `scheme://host/prefix` from the separate connection settings.
pub(crate) fn compose_base_url(host: &str, prefix: &str, secure: bool) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else if secure {
        format!("https://{}", host)
    } else {
        format!("http://{}", host)
    };
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        normalize_base_url(&host)
    } else {
        normalize_base_url(&format!("{}/{}", host, prefix))
    }
}

pub(crate) fn shared_http_client() -> Result<&'static Client> {
    HTTP_CLIENT
        .get_or_init(|| {
            Client::builder()
                .connect_timeout(Duration::from_secs(8))
                .timeout(Duration::from_secs(20))
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(16)
                .user_agent(concat!("screeps-map-downloader/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|error| format!("failed to initialize http client: {}", error))
        })
        .as_ref()
        .map_err(|error| ScreepsError::Network(error.clone()))
}

fn serialize_query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(boolean) => Some(boolean.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

pub(crate) fn build_query_pairs(query: &HashMap<String, Value>) -> Vec<(String, String)> {
    let mut query_pairs: Vec<(String, String)> = Vec::with_capacity(query.len());
    for (key, value) in query {
        if let Some(serialized) = serialize_query_value(value) {
            query_pairs.push((key.clone(), serialized));
        }
    }
    query_pairs
        .sort_unstable_by(|left, right| left.0.cmp(&right.0).then_with(|| left.1.cmp(&right.1)));
    query_pairs
}

pub(crate) fn request_url(request: &ScreepsRequest) -> String {
    let base_url = normalize_base_url(&request.base_url);
    let endpoint = normalize_endpoint(&request.endpoint);
    format!("{}{}", base_url, endpoint)
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice::<Value>(bytes).unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(bytes).to_string();
            json!({ "text": text })
        })
    }
}

pub(crate) async fn perform_screeps_request(
    client: &Client,
    request: ScreepsRequest,
) -> Result<ScreepsResponse> {
    let url = request_url(&request);
    let is_get_method = request.method == Method::GET;

    let query_pairs = request.query.as_ref().map(build_query_pairs).unwrap_or_default();

    let mut req = client.request(request.method.clone(), &url).header("Accept", "application/json");

    if !query_pairs.is_empty() {
        req = req.query(&query_pairs);
    }

    if let Some(token) = request.token.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        req = req.header("X-Token", token);
    }

    if let Some(username) =
        request.username.as_deref().map(str::trim).filter(|value| !value.is_empty())
    {
        req = req.header("X-Username", username);
    }

    if !is_get_method {
        if let Some(body) = request.body.as_ref() {
            req = req.json(body);
        }
    }

    tracing::debug!(method = %request.method, url = %url, "Sending request");
    let response = req.send().await?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let bytes = response.bytes().await?;

    Ok(ScreepsResponse {
        status,
        ok: (200..300).contains(&status),
        data: decode_body(&bytes),
        url: final_url,
    })
}
