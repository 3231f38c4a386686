//! Provider adapters
//!
//! One client per external AI vendor. Each client wraps HTTP calls to a
//! fixed base URL with vendor-specific auth headers and payload shapes, and
//! maps every failure into one of three always-distinguished categories so
//! callers can decide retry policy:
//!
//! | Variant   | Meaning                                   | Retryable |
//! |-----------|-------------------------------------------|-----------|
//! | Transport | network / timeout talking to the vendor   | Yes       |
//! | Protocol  | non-JSON or unexpected-schema payload     | No        |
//! | Upstream  | vendor returned a structured error body   | No        |

pub mod coze;
pub mod glm;
pub mod qwen;

pub use coze::{CozeChatResult, CozeClient};
pub use glm::GlmClient;
pub use qwen::{AppOutput, QwenAgentApp, QwenClient};

use std::time::Duration;
use thiserror::Error;

/// Unified provider error type, shared by all adapters
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network-level failure reaching the vendor (safe to retry)
    #[error("transport error for {provider}: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// Vendor responded with a malformed or unexpected-schema payload
    #[error("protocol error for {provider}: {message}")]
    Protocol {
        provider: &'static str,
        message: String,
    },

    /// Vendor returned a non-success status with a structured error body;
    /// the vendor's own diagnostics are preserved for support
    #[error("upstream error for {provider} [{code}]: {message}")]
    Upstream {
        provider: &'static str,
        request_id: Option<String>,
        code: String,
        message: String,
    },
}

impl ProviderError {
    pub fn transport<S: Into<String>>(provider: &'static str, message: S) -> Self {
        Self::Transport {
            provider,
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(provider: &'static str, message: S) -> Self {
        Self::Protocol {
            provider,
            message: message.into(),
        }
    }

    pub fn upstream<C: Into<String>, M: Into<String>>(
        provider: &'static str,
        request_id: Option<String>,
        code: C,
        message: M,
    ) -> Self {
        Self::Upstream {
            provider,
            request_id,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Only transport failures are safe to retry blindly
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Upstream { provider, .. } => provider,
        }
    }
}

/// Build the shared HTTP client used for synchronous vendor calls
///
/// Every non-streaming provider round-trip runs under this bounded timeout.
pub(crate) fn build_http_client(
    provider: &'static str,
    timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::transport(provider, e.to_string()))
}

/// Build the HTTP client used for streaming calls
///
/// No overall timeout: the provider's stream is allowed to be long-lived,
/// only the connect phase is bounded.
pub(crate) fn build_streaming_client(
    provider: &'static str,
    connect_timeout: Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| ProviderError::transport(provider, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_the_only_retryable_kind() {
        assert!(ProviderError::transport("glm", "timed out").is_retryable());
        assert!(!ProviderError::protocol("glm", "bad json").is_retryable());
        assert!(!ProviderError::upstream("glm", None, "1002", "denied").is_retryable());
    }

    #[test]
    fn upstream_error_keeps_vendor_diagnostics() {
        let err = ProviderError::upstream(
            "qwen",
            Some("rid-42".to_string()),
            "Throttling",
            "requests throttled",
        );
        match err {
            ProviderError::Upstream {
                request_id, code, ..
            } => {
                assert_eq!(request_id.as_deref(), Some("rid-42"));
                assert_eq!(code, "Throttling");
            }
            _ => panic!("expected upstream error"),
        }
    }
}
