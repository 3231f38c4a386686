//! Gateway error taxonomy
//!
//! Two layers. `ProviderError` (in `core::providers`) classifies what went
//! wrong talking to a vendor; `GatewayError` is the service-level error every
//! handler returns, carrying either a gateway-side failure or a wrapped
//! provider failure. The `ResponseError` impl is the single place HTTP status
//! codes and response bodies are decided.
//!
//! User-facing messages keep the wording the frontend expects, including the
//! Chinese validation and auth messages.

use crate::core::providers::ProviderError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Service-level error returned by every handler
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required provider credentials or settings are missing
    #[error("configuration error: {0}")]
    Config(String),

    /// The request shape is invalid (missing or malformed field)
    #[error("validation error: {0}")]
    Validation(String),

    /// The conversational input was empty or whitespace-only
    #[error("empty input")]
    EmptyInput,

    /// Opening a provider-side session failed
    #[error("session initialization failed: {0}")]
    SessionInit(String),

    /// The request carries no usable caller identity
    #[error("unauthenticated")]
    Unauthenticated,

    /// A provider call failed; the original classification is preserved
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Media library failure
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unclassified internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn session_init<S: Into<String>>(message: S) -> Self {
        Self::SessionInit(message.into())
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

/// JSON body of every error response: `{"error": ...}` plus optional
/// vendor diagnostics on upstream failures
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new<S: Into<String>>(error: S) -> Self {
        Self {
            error: error.into(),
            code: None,
            request_id: None,
            message: None,
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::EmptyInput => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Provider(ProviderError::Transport { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(ProviderError::Protocol { .. }) => StatusCode::BAD_GATEWAY,
            Self::Provider(ProviderError::Upstream { .. })
            | Self::Config(_)
            | Self::SessionInit(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::EmptyInput => ErrorBody::new("输入内容不能为空"),
            Self::Validation(message) => ErrorBody::new(message.clone()),
            Self::Unauthenticated => ErrorBody::new("未登录"),
            Self::SessionInit(_) => ErrorBody::new("会话初始化失败"),
            Self::Config(message) => ErrorBody::new(message.clone()),
            Self::Provider(ProviderError::Transport { message, .. }) => {
                ErrorBody::new(format!("API request failed: {}", message))
            }
            Self::Provider(ProviderError::Protocol { .. }) => {
                ErrorBody::new("Invalid API response format")
            }
            Self::Provider(ProviderError::Upstream {
                request_id,
                code,
                message,
                ..
            }) => ErrorBody {
                error: "模型请求失败".to_string(),
                code: Some(code.clone()),
                request_id: request_id.clone(),
                message: Some(message.clone()),
            },
            Self::Storage(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorBody::new("Internal server error")
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    fn body_json(err: &GatewayError) -> serde_json::Value {
        let response = err.error_response();
        let bytes = response.into_body().try_into_bytes().unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn empty_input_maps_to_400_with_exact_message() {
        let err = GatewayError::EmptyInput;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&err)["error"], "输入内容不能为空");
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = GatewayError::Unauthenticated;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(&err)["error"], "未登录");
    }

    #[test]
    fn session_init_failure_maps_to_500_with_fixed_message() {
        let err = GatewayError::session_init("missing session_id in response");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&err)["error"], "会话初始化失败");
    }

    #[test]
    fn upstream_error_passes_vendor_diagnostics_through() {
        let err = GatewayError::from(ProviderError::upstream(
            "qwen",
            Some("rid-1".to_string()),
            "Throttling",
            "requests throttled",
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(&err);
        assert_eq!(body["error"], "模型请求失败");
        assert_eq!(body["code"], "Throttling");
        assert_eq!(body["request_id"], "rid-1");
        assert_eq!(body["message"], "requests throttled");
    }

    #[test]
    fn transport_and_protocol_errors_map_to_503_and_502() {
        let transport = GatewayError::from(ProviderError::transport("glm", "timed out"));
        assert_eq!(transport.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(&transport)["error"],
            "API request failed: timed out"
        );

        let protocol = GatewayError::from(ProviderError::protocol("glm", "not json"));
        assert_eq!(protocol.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(&protocol)["error"], "Invalid API response format");
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let err = GatewayError::storage("disk full at /var/media");
        assert_eq!(body_json(&err)["error"], "Internal server error");
    }
}
