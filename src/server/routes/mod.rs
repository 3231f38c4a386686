//! HTTP route modules
//!
//! Handlers are grouped by concern: single-shot provider chat, media
//! generation and understanding, multi-turn conversation and the upload
//! endpoint.

pub mod chat;
pub mod conversation;
pub mod media;
pub mod upload;

use crate::core::providers::ProviderError;
use crate::utils::error::ErrorBody;
use actix_web::HttpResponse;

/// 400 response with a bare `{"error": ...}` body
pub(crate) fn validation_error(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorBody::new(message))
}

/// Map a provider failure for the pass-through endpoints
///
/// These endpoints treat any vendor-side rejection as the service being
/// unavailable (503) rather than surfacing the vendor's status, keeping the
/// diagnostics in the body for support.
pub(crate) fn provider_unavailable(e: &ProviderError) -> HttpResponse {
    let body = match e {
        ProviderError::Transport { message, .. } => {
            ErrorBody::new(format!("API request failed: {}", message))
        }
        ProviderError::Protocol { .. } => {
            return HttpResponse::BadGateway().json(ErrorBody::new("Invalid API response format"));
        }
        ProviderError::Upstream {
            request_id,
            code,
            message,
            ..
        } => ErrorBody {
            error: "模型请求失败".to_string(),
            code: Some(code.clone()),
            request_id: request_id.clone(),
            message: Some(message.clone()),
        },
    };
    HttpResponse::ServiceUnavailable().json(body)
}
