//! Structured logging with correlation tracking for API operations
//!
//! Each logical call (a request with its retries, or a whole pagination run)
//! carries one correlation id through every log line and outgoing request.

use log::{debug, error, info, warn};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const MASK: &str = "***";

/// Context for a single logical API operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Unique correlation ID for this operation
    pub correlation_id: String,
    /// GET, POST, PATCH, DELETE or "query"
    pub operation: String,
    /// Resource path relative to the API base
    pub path: String,
    pub start_time: Instant,
}

impl OperationContext {
    pub fn new(operation: &str, path: &str) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            path: path.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log an outgoing request, with credentials masked
    pub fn log_request(&self, attempt: u32, url: &str, headers: &HeaderMap) {
        let log_data = json!({
            "event": "http_request",
            "correlation_id": self.correlation_id,
            "operation": self.operation,
            "attempt": attempt + 1,
            "url": url,
            "headers": sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        debug!("HTTP Request: {}", log_data);
    }

    pub fn log_response(&self, status: u16, duration: Duration) {
        let log_data = json!({
            "event": "http_response",
            "correlation_id": self.correlation_id,
            "operation": self.operation,
            "path": self.path,
            "status_code": status,
            "duration_ms": duration.as_millis(),
        });

        if status >= 400 {
            warn!("HTTP Response (Error): {}", log_data);
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    pub fn log_retry(&self, attempt: u32, error: &str, delay: Duration) {
        let log_data = json!({
            "event": "retry_attempt",
            "correlation_id": self.correlation_id,
            "operation": self.operation,
            "path": self.path,
            "attempt": attempt + 1,
            "error": error,
            "delay_ms": delay.as_millis(),
        });

        warn!("Retry Attempt: {}", log_data);
    }

    /// Log the end of the operation with its outcome
    pub fn complete(&self, success: bool, detail: Value) {
        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": self.correlation_id,
            "operation": self.operation,
            "path": self.path,
            "success": success,
            "duration_ms": self.elapsed().as_millis(),
            "detail": detail,
        });

        if success {
            info!("API Operation Completed: {}", log_data);
        } else {
            error!("API Operation Failed: {}", log_data);
        }
    }
}

/// Copy headers into a loggable map, masking anything credential-like.
///
/// A bearer credential keeps its scheme (`Bearer ***`); other sensitive
/// values become `***`.
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let key = name.as_str();
            let text = value.to_str().unwrap_or("<binary>");
            (key.to_string(), mask_value(key, text))
        })
        .collect()
}

fn mask_value(name: &str, value: &str) -> String {
    let sensitive = ["authorization", "token", "secret", "cookie"]
        .iter()
        .any(|marker| name.contains(marker));
    if !sensitive {
        return value.to_string();
    }

    match value.split_once(' ') {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => {
            format!("{} {}", scheme, MASK)
        }
        _ => MASK.to_string(),
    }
}
