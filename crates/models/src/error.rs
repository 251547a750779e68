use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorShape {
    pub error_message: String,
    pub error_type: String,
}

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Telegram {method} failed: {status} - {body}")]
    Telegram {
        method: String,
        status: u16,
        body: String,
    },

    #[error("Transkriptor request failed: {status} - {body}")]
    Transkriptor { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid update: {reason}")]
    InvalidUpdate { reason: String },

    #[error("Invalid upstream response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Internal server error: {reason}")]
    InternalError { reason: String },
}

impl ScribeError {
    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape {
            error_message: self.to_string(),
            error_type: self.error_type().to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ScribeError::ConfigError { .. } => "ConfigurationError",
            ScribeError::Telegram { .. } => "TelegramError",
            ScribeError::Transkriptor { .. } => "TranskriptorError",
            ScribeError::Http(_) => "UpstreamUnavailable",
            ScribeError::InvalidUpdate { .. } => "InvalidParameterValueException",
            ScribeError::InvalidResponse { .. } => "InvalidUpstreamResponse",
            ScribeError::InternalError { .. } => "ServiceException",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ScribeError::ConfigError { .. } => 500,
            ScribeError::Telegram { .. } => 502,
            ScribeError::Transkriptor { .. } => 502,
            ScribeError::Http(_) => 502,
            ScribeError::InvalidUpdate { .. } => 400,
            ScribeError::InvalidResponse { .. } => 502,
            ScribeError::InternalError { .. } => 500,
        }
    }

    /// Body text to surface to a chat when an upstream call fails.
    pub fn upstream_detail(&self) -> String {
        match self {
            ScribeError::Telegram { body, .. } | ScribeError::Transkriptor { body, .. } => {
                body.clone()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_detail_prefers_response_body() {
        let err = ScribeError::Transkriptor {
            status: 402,
            body: "{\"error\":\"insufficient credits\"}".to_string(),
        };
        assert_eq!(err.upstream_detail(), "{\"error\":\"insufficient credits\"}");
        assert_eq!(err.http_status(), 502);

        let err = ScribeError::InvalidResponse {
            reason: "missing order_id".to_string(),
        };
        assert_eq!(
            err.upstream_detail(),
            "Invalid upstream response: missing order_id"
        );
    }

    #[test]
    fn error_shape_carries_type() {
        let shape = ScribeError::InvalidUpdate {
            reason: "not json".to_string(),
        }
        .to_error_shape();
        assert_eq!(shape.error_type, "InvalidParameterValueException");
        assert!(shape.error_message.contains("not json"));
    }
}
