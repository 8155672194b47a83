//! HTTP client for the external CRM
//!
//! Each endpoint returns either a JSON array of records or an object that
//! wraps the array under `data`, `results` or `items`.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::EdutrackErrorTrait;
use crate::utils::retry::{with_retry, RetryConfig};

use super::error::SyncError;

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the CRM client
#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    /// Base URL; endpoint names are appended as path segments
    pub base_url: String,

    /// Optional bearer token
    pub api_key: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Retry behavior for transient failures
    pub retry: RetryConfig,
}

impl CrmClientConfig {
    /// Create a new client config
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry behavior
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// CRM Client
// ============================================================================

/// Client for the CRM record endpoints
pub struct CrmClient {
    config: CrmClientConfig,
    base_url: Url,
    http_client: Client,
}

impl CrmClient {
    /// Create a new CRM client
    pub fn new(config: CrmClientConfig) -> Result<Self, SyncError> {
        let mut base_url = Url::parse(config.base_url.trim())
            .map_err(|_| SyncError::InvalidUrl(config.base_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(config.base_url.clone()));
        }
        // Treat the base as a directory so joins append instead of replace
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("edutrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Init(e.to_string()))?;

        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    /// Course records
    pub async fn fetch_courses(&self) -> Result<Vec<Value>, SyncError> {
        self.fetch_records("courses").await
    }

    /// Trainer (instructor) records
    pub async fn fetch_trainers(&self) -> Result<Vec<Value>, SyncError> {
        self.fetch_records("trainers").await
    }

    /// Lead (prospective student) records
    pub async fn fetch_leads(&self) -> Result<Vec<Value>, SyncError> {
        self.fetch_records("leads").await
    }

    /// Fetch one endpoint and unwrap its record list
    pub async fn fetch_records(&self, endpoint: &str) -> Result<Vec<Value>, SyncError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|_| SyncError::InvalidUrl(format!("{}{endpoint}", self.base_url)))?;

        let body = with_retry(
            &self.config.retry,
            || self.get_json(&url, endpoint),
            |e: &SyncError| e.is_recoverable(),
        )
        .await?;

        let records = extract_records(endpoint, body)?;
        debug!(endpoint, count = records.len(), "Fetched CRM records");
        Ok(records)
    }

    // Internal: single GET attempt
    async fn get_json(&self, url: &Url, endpoint: &str) -> Result<Value, SyncError> {
        let mut request = self.http_client.get(url.clone());
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::network(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SyncError::network(endpoint, e))?;
        serde_json::from_str(&text).map_err(|e| SyncError::payload(endpoint, e.to_string()))
    }
}

/// Unwrap a record list from a response body
pub fn extract_records(endpoint: &str, body: Value) -> Result<Vec<Value>, SyncError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ["data", "results", "items"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return Ok(items);
                }
            }
            Err(SyncError::payload(
                endpoint,
                "object without a data, results or items array",
            ))
        }
        other => Err(SyncError::payload(
            endpoint,
            format!("expected an array or object, got {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_config_builder() {
        let config = CrmClientConfig::new("http://crm.local/api")
            .with_api_key("secret")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let err = CrmClient::new(CrmClientConfig::new("not a url")).err();
        assert!(matches!(err, Some(SyncError::InvalidUrl(_))));
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = CrmClient::new(CrmClientConfig::new("http://crm.local/api/v1")).unwrap();
        let url = client.base_url.join("courses").unwrap();
        assert_eq!(url.as_str(), "http://crm.local/api/v1/courses");
    }

    #[test]
    fn test_extract_records_shapes() {
        let plain = extract_records("courses", json!([{"code": "A"}])).unwrap();
        assert_eq!(plain.len(), 1);

        for key in ["data", "results", "items"] {
            let mut body = serde_json::Map::new();
            body.insert(key.to_string(), json!([{}, {}]));
            let wrapped = extract_records("courses", Value::Object(body)).unwrap();
            assert_eq!(wrapped.len(), 2);
        }

        let err = extract_records("courses", json!({"total": 3})).unwrap_err();
        assert!(matches!(err, SyncError::Payload { .. }));

        let err = extract_records("courses", json!("nope")).unwrap_err();
        assert!(err.to_string().contains("got string"));
    }
}
