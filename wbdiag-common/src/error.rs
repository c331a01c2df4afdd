use serde_json::Value;
use thiserror::Error;

/// A failed call against a Google Cloud API.
///
/// Built either from a non-success HTTP response (Google's JSON error envelope is
/// parsed when present) or from a transport failure, in which case `status` is `None`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("can't fetch data from {method}, reason: {message}")]
pub struct GcpApiError {
    /// API method that failed, e.g. `projects.locations.instances.list`.
    pub method: String,
    pub status: Option<u16>,
    pub message: String,
    /// `error.details[].reason` (e.g. `SERVICE_DISABLED`), if any.
    pub reason: Option<String>,
    /// `error.details[].metadata.service`, if any.
    pub service: Option<String>,
    /// Raw response body as returned by the API.
    pub body: Option<String>,
}

impl GcpApiError {
    pub fn from_response(method: &str, status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));

        let message = error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                let text = body.trim();
                if text.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    text.to_string()
                }
            });

        let details = error
            .and_then(|e| e.get("details"))
            .and_then(|d| d.as_array());
        let reason = details.and_then(|d| {
            d.iter()
                .find_map(|item| item.get("reason").and_then(|r| r.as_str()))
                .map(|s| s.to_string())
        });
        let service = details.and_then(|d| {
            d.iter()
                .find_map(|item| item["metadata"]["service"].as_str())
                .map(|s| s.to_string())
        });

        Self {
            method: method.to_string(),
            status: Some(status),
            message,
            reason,
            service,
            body: Some(body.to_string()),
        }
    }

    pub fn transport(method: &str, err: impl std::fmt::Display) -> Self {
        Self {
            method: method.to_string(),
            status: None,
            message: err.to_string(),
            reason: None,
            service: None,
            body: None,
        }
    }

    /// 429 and 5xx responses, plus transport failures, are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code == 429 || (500..600).contains(&code),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiagError {
    #[error(transparent)]
    Api(#[from] GcpApiError),

    /// Malformed upstream response or broken internal invariant.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown instance health state: {0}")]
    UnknownHealthState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = DiagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_google_error_envelope() {
        let body = r#"{
          "error": {
            "code": 403,
            "message": "Notebooks API has not been used in project 12340001 before or it is disabled.",
            "status": "PERMISSION_DENIED",
            "details": [
              {
                "@type": "type.googleapis.com/google.rpc.ErrorInfo",
                "reason": "SERVICE_DISABLED",
                "domain": "googleapis.com",
                "metadata": { "service": "notebooks.googleapis.com", "consumer": "projects/12340001" }
              }
            ]
          }
        }"#;
        let err = GcpApiError::from_response("projects.locations.instances.list", 403, body);
        assert_eq!(err.status, Some(403));
        assert!(err.message.starts_with("Notebooks API has not been used"));
        assert_eq!(err.reason.as_deref(), Some("SERVICE_DISABLED"));
        assert_eq!(err.service.as_deref(), Some("notebooks.googleapis.com"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn falls_back_to_raw_body() {
        let err = GcpApiError::from_response("m", 502, "Bad Gateway");
        assert_eq!(err.message, "Bad Gateway");
        assert_eq!(err.reason, None);
        assert!(err.is_retryable());

        let err = GcpApiError::from_response("m", 500, "  ");
        assert_eq!(err.message, "HTTP 500");
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = GcpApiError::transport("m", "connection reset");
        assert_eq!(err.status, None);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "can't fetch data from m, reason: connection reset");
    }

    #[test]
    fn api_error_converts_into_diag_error() {
        let diag: DiagError = GcpApiError::from_response("m", 429, "").into();
        assert!(matches!(diag, DiagError::Api(ref e) if e.status == Some(429)));
    }
}
