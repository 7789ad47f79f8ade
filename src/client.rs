use std::fmt;
use std::io::Read;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{ColumnStats, DataResponse, MetadataResponse, UniqueValues};
use crate::query::DataRequest;

/// Path segment all endpoints live under on the backend.
const API_NAMESPACE: &str = "tabular-data";

/// Failure of a backend call. Parse failures on a 2xx response are not an
/// error: the raw body text is passed through as a JSON string instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Transport failure before any response was received.
    Network(String),
    /// The backend answered with a non-2xx status.
    Response { status: u16, message: String },
    /// A 2xx JSON body that does not match the expected response shape.
    Decode(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Response { status, message } => write!(f, "server error {status}: {message}"),
            ApiError::Decode(msg) => write!(f, "unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// The paging backend as seen by the viewer: one JSON-in, JSON-out call per
/// endpoint, no retries, every failure propagated to the caller. Tests
/// substitute an in-memory implementation.
pub trait Backend: Send + Sync {
    fn call(&self, endpoint: &str, payload: &Value) -> Result<Value, ApiError>;
}

/// HTTP implementation of [`Backend`] against a fixed base URL.
pub struct Client {
    agent: ureq::Agent,
    base_url: String,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_NAMESPACE, endpoint)
    }
}

impl Backend for Client {
    fn call(&self, endpoint: &str, payload: &Value) -> Result<Value, ApiError> {
        let url = self.endpoint_url(endpoint);
        debug!("POST {url}");
        match self.agent.post(&url).send_json(payload) {
            Ok(response) => {
                let text = read_body(response)?;
                Ok(parse_body(text))
            }
            Err(ureq::Error::Status(status, response)) => {
                let text = read_body(response).unwrap_or_default();
                let message = error_message(&text);
                warn!("{endpoint} failed with status {status}: {message}");
                Err(ApiError::Response { status, message })
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!("{endpoint} transport failure: {transport}");
                Err(ApiError::Network(transport.to_string()))
            }
        }
    }
}

fn read_body(response: ureq::Response) -> Result<String, ApiError> {
    let mut text = String::new();
    response
        .into_reader()
        .read_to_string(&mut text)
        .map_err(|e| ApiError::Network(e.to_string()))?;
    Ok(text)
}

/// A non-empty body that is not valid JSON is passed through as raw text
/// rather than failing the call.
fn parse_body(text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Error text for a non-2xx body: the JSON `message` or `error` field when
/// present, otherwise the body itself.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body)
        && let Some(message) = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
    {
        return message.to_string();
    }
    body.to_string()
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

pub fn fetch_metadata(backend: &dyn Backend, path: &str) -> Result<MetadataResponse, ApiError> {
    let value = backend.call("metadata", &serde_json::json!({ "path": path }))?;
    decode(value)
}

pub fn fetch_data(backend: &dyn Backend, request: &DataRequest) -> Result<DataResponse, ApiError> {
    let payload =
        serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
    let value = backend.call("data", &payload)?;
    decode(value)
}

/// Fetch column statistics, keeping the raw JSON alongside the decoded
/// record so the overlay can copy exactly what the backend sent.
pub fn fetch_column_stats(
    backend: &dyn Backend,
    path: &str,
    column: &str,
) -> Result<(ColumnStats, Value), ApiError> {
    let value = backend.call(
        "column-stats",
        &serde_json::json!({ "path": path, "columnName": column }),
    )?;
    let stats = decode(value.clone())?;
    Ok((stats, value))
}

pub fn fetch_unique_values(
    backend: &dyn Backend,
    path: &str,
    column: &str,
    limit: usize,
) -> Result<UniqueValues, ApiError> {
    let value = backend.call(
        "unique-values",
        &serde_json::json!({ "path": path, "columnName": column, "limit": limit }),
    )?;
    decode(value)
}
