/// Error types for the authenticated request pipeline
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// No response arrived: connect failure, timeout, or unreadable body.
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// 401 from an ordinary endpoint. Recoverable through a refresh.
    #[error("Unauthorized{}", fmt_detail(.detail))]
    Unauthorized { detail: Option<String> },

    /// 401 from the refresh endpoint. The session cannot be recovered.
    #[error("Session expired")]
    SessionExpired,

    #[error("Request failed with status {status}{}", fmt_detail(.detail))]
    Validation { status: u16, detail: Option<String> },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Rejected(String),
}

fn fmt_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

impl ApiError {
    /// Build the error for a non-2xx response.
    ///
    /// `refresh_endpoint` marks responses from the refresh call, whose 401 is
    /// terminal rather than recoverable.
    pub fn from_status(status: u16, body: &[u8], refresh_endpoint: bool) -> Self {
        let detail = extract_detail(body);
        match status {
            401 if refresh_endpoint => ApiError::SessionExpired,
            401 => ApiError::Unauthorized { detail },
            _ => ApiError::Validation { status, detail },
        }
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } | ApiError::SessionExpired => Some(401),
            ApiError::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Structured detail supplied by the server
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { detail } | ApiError::Validation { detail, .. } => {
                detail.as_deref()
            }
            _ => None,
        }
    }

    /// Human-readable message: server detail, else the error text, else `fallback`.
    pub fn describe(&self, fallback: &str) -> String {
        if let Some(detail) = self.detail().filter(|d| !d.is_empty()) {
            return detail.to_string();
        }
        let message = match self {
            ApiError::Transport(message) | ApiError::Rejected(message) => message.clone(),
            other => other.to_string(),
        };
        if message.is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

/// Read `detail` from an error payload of the form `{"detail": ...}`.
///
/// A list of validation items is flattened into their `msg` fields.
fn extract_detail(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    match payload.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_body() || err.is_decode() {
            "body error"
        } else {
            "request error"
        };
        ApiError::Transport(format!("{} ({})", err, kind))
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
