//! Remote layout analysis against Azure Form Recognizer / Document Intelligence.
//!
//! ## Protocol
//!
//! ```text
//! POST {endpoint}/formrecognizer/documentModels/{model}:analyze?api-version={v}
//!      Ocp-Apim-Subscription-Key: {key}
//!      Content-Type: application/pdf
//!      <document bytes>
//!   ◀── 202 Accepted, Operation-Location: {operation url}
//!
//! GET {operation url}            (repeat until status is terminal)
//!   ◀── 200 {"status": "running" | "succeeded" | "failed", "analyzeResult": {...}}
//! ```
//!
//! Each call to [`FormRecognizerAnalyzer::analyze`] builds its own HTTP
//! client and drops it on return; nothing is shared between documents.
//!
//! Error responses from the service become
//! [`ExtractError::RemoteRequestFailed`]. Anything that never produced a
//! response (DNS, connect, timeout) is [`ExtractError::Transport`].

use crate::config::{Credentials, SessionConfig};
use crate::error::ExtractError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

/// Header carrying the subscription key.
pub const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
/// Header carrying the long-running operation URL.
pub const OPERATION_LOCATION: &str = "operation-location";

/// Structured layout returned by the service.
///
/// `analyze_result` is kept as the service sent it; the accessors below only
/// count top-level collections for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutAnalysisResult {
    pub model_id: String,
    pub api_version: String,
    pub analyze_result: Value,
}

impl LayoutAnalysisResult {
    pub fn page_count(&self) -> usize {
        self.collection_len("pages")
    }

    pub fn table_count(&self) -> usize {
        self.collection_len("tables")
    }

    pub fn paragraph_count(&self) -> usize {
        self.collection_len("paragraphs")
    }

    pub fn key_value_pair_count(&self) -> usize {
        self.collection_len("keyValuePairs")
    }

    fn collection_len(&self, field: &str) -> usize {
        self.analyze_result
            .get(field)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

/// Submits one document for layout analysis and waits for the result.
#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        path: &Path,
        credentials: &Credentials,
    ) -> Result<LayoutAnalysisResult, ExtractError>;
}

/// [`LayoutAnalyzer`] speaking the Form Recognizer REST protocol.
#[derive(Debug, Clone)]
pub struct FormRecognizerAnalyzer {
    model_id: String,
    api_version: String,
    poll_interval: Duration,
    request_timeout: Duration,
}

impl FormRecognizerAnalyzer {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            model_id: config.model_id.clone(),
            api_version: config.api_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// URL of the analyze call for `endpoint`.
    pub fn analyze_url(&self, endpoint: &str) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            endpoint.trim_end_matches('/'),
            self.model_id,
            self.api_version
        )
    }
}

#[async_trait]
impl LayoutAnalyzer for FormRecognizerAnalyzer {
    async fn analyze(
        &self,
        path: &Path,
        credentials: &Credentials,
    ) -> Result<LayoutAnalysisResult, ExtractError> {
        let start = Instant::now();
        let bytes = tokio::fs::read(path).await.map_err(|e| ExtractError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let url = self.analyze_url(credentials.endpoint());
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| transport(&url, e))?;

        debug!("Submitting {} bytes to {}", bytes.len(), url);
        let response = client
            .post(&url)
            .header(KEY_HEADER, credentials.key())
            .header(CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(remote_failure(response).await);
        }

        let operation_url = response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::RemoteRequestFailed {
                status: Some(status.as_u16()),
                code: None,
                message: "Analyze response did not include an Operation-Location header".into(),
            })?;

        let mut delay = retry_after(response.headers()).unwrap_or(self.poll_interval);
        let mut polls = 0u32;

        loop {
            sleep(delay).await;
            polls += 1;

            let response = client
                .get(&operation_url)
                .header(KEY_HEADER, credentials.key())
                .send()
                .await
                .map_err(|e| transport(&operation_url, e))?;

            if !response.status().is_success() {
                return Err(remote_failure(response).await);
            }

            delay = retry_after(response.headers()).unwrap_or(self.poll_interval);
            let operation: OperationStatus = response
                .json()
                .await
                .map_err(|e| transport(&operation_url, e))?;

            match operation.status.as_str() {
                "succeeded" => {
                    info!(
                        "Layout analysis succeeded after {} polls in {}ms",
                        polls,
                        start.elapsed().as_millis()
                    );
                    return Ok(LayoutAnalysisResult {
                        model_id: self.model_id.clone(),
                        api_version: self.api_version.clone(),
                        analyze_result: operation.analyze_result.unwrap_or(Value::Null),
                    });
                }
                "failed" | "canceled" => {
                    let (code, message) = operation
                        .error
                        .as_ref()
                        .map(describe_service_error)
                        .unwrap_or((None, None));
                    return Err(ExtractError::RemoteRequestFailed {
                        status: None,
                        code,
                        message: message
                            .unwrap_or_else(|| format!("Analyze operation {}", operation.status)),
                    });
                }
                other => debug!("Operation status '{}' (poll {})", other, polls),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    analyze_result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn transport(url: &str, e: reqwest::Error) -> ExtractError {
    ExtractError::Transport {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

/// Seconds from a `Retry-After` header, when it holds an integer.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Turn a non-success response into [`ExtractError::RemoteRequestFailed`].
async fn remote_failure(response: reqwest::Response) -> ExtractError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = parse_error_body(&body);
    ExtractError::RemoteRequestFailed {
        status: Some(status.as_u16()),
        code,
        message: message.unwrap_or_else(|| {
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            if body.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{}: {}", reason, body.trim())
            }
        }),
    }
}

/// Parse `{"error": {"code": ..., "message": ...}}`.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned())
        .map(|e| describe_service_error(&e))
        .unwrap_or((None, None))
}

/// Code and message of a service error object, folding in `innererror`.
fn describe_service_error(error: &Value) -> (Option<String>, Option<String>) {
    let code = error.get("code").and_then(scalar_to_string);
    let mut message = error.get("message").and_then(scalar_to_string);

    if let Some(inner) = error.get("innererror") {
        let inner_code = inner.get("code").and_then(scalar_to_string);
        let inner_message = inner.get("message").and_then(scalar_to_string);
        if let Some(detail) = match (inner_code, inner_message) {
            (Some(c), Some(m)) => Some(format!("{c}: {m}")),
            (Some(c), None) => Some(c),
            (None, Some(m)) => Some(m),
            (None, None) => None,
        } {
            message = Some(match message {
                Some(m) => format!("{m}\nInner error: {detail}"),
                None => detail,
            });
        }
    }

    (code, message)
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn analyzer() -> FormRecognizerAnalyzer {
        FormRecognizerAnalyzer::from_config(&SessionConfig::default())
    }

    #[test]
    fn analyze_url_strips_trailing_slash() {
        let url = analyzer().analyze_url("https://res.cognitiveservices.azure.com/");
        assert_eq!(
            url,
            "https://res.cognitiveservices.azure.com/formrecognizer/documentModels/prebuilt-layout:analyze?api-version=2023-07-31"
        );
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn error_body_with_numeric_code() {
        let body = r#"{"error":{"code":401,"message":"Access denied due to invalid subscription key."}}"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code.as_deref(), Some("401"));
        assert!(message.unwrap().contains("invalid subscription key"));
    }

    #[test]
    fn error_body_folds_inner_error() {
        let body = json!({
            "error": {
                "code": "InvalidRequest",
                "message": "Invalid request.",
                "innererror": {"code": "InvalidContent", "message": "The file is corrupted."}
            }
        })
        .to_string();
        let (code, message) = parse_error_body(&body);
        assert_eq!(code.as_deref(), Some("InvalidRequest"));
        let message = message.unwrap();
        assert!(message.contains("Invalid request."));
        assert!(message.contains("InvalidContent: The file is corrupted."));
    }

    #[test]
    fn error_body_not_json() {
        assert_eq!(parse_error_body("<html>gateway</html>"), (None, None));
    }

    #[test]
    fn result_counts_collections() {
        let result = LayoutAnalysisResult {
            model_id: "prebuilt-layout".into(),
            api_version: "2023-07-31".into(),
            analyze_result: json!({
                "pages": [{}, {}],
                "tables": [{}],
                "paragraphs": [{}, {}, {}]
            }),
        };
        assert_eq!(result.page_count(), 2);
        assert_eq!(result.table_count(), 1);
        assert_eq!(result.paragraph_count(), 3);
        assert_eq!(result.key_value_pair_count(), 0);
    }
}
