//! Single-shot provider chat endpoints
//!
//! Stateless request/response endpoints that forward one prompt to a vendor
//! and return its reply. Nothing here touches the session store.

use crate::core::types::ConversationTurn;
use crate::server::routes::{provider_unavailable, validation_error};
use crate::server::state::AppState;
use crate::utils::error::GatewayError;
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const GLM_CHAT_MODEL: &str = "glm-4";
const GLM_VISION_MODEL: &str = "glm-4v-flash";
const QWEN_CHAT_MODEL: &str = "qwen2.5-1.5b-instruct";

/// Default persona for the plain Qwen chat endpoint
const QWEN_CHAT_SYSTEM_ROLE: &str = "用最温柔的语气回复我的问题";

#[derive(Debug, Deserialize)]
pub struct GlmChatRequest {
    pub question: Option<String>,
    pub model: Option<String>,
}

/// POST /api/glm/chat
pub async fn glm_chat(
    state: web::Data<AppState>,
    request: web::Json<GlmChatRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    let Some(question) = request.question.filter(|q| !q.trim().is_empty()) else {
        return Ok(validation_error("question is required"));
    };
    let model = request.model.as_deref().unwrap_or(GLM_CHAT_MODEL);
    info!(model, "GLM chat request");

    match state.glm.chat(&question, model).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct GlmVisionRequest {
    pub messages: Option<Vec<ConversationTurn>>,
    pub model: Option<String>,
}

/// POST /api/glm/vision
pub async fn glm_vision(
    state: web::Data<AppState>,
    request: web::Json<GlmVisionRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    let Some(messages) = request.messages.filter(|m| !m.is_empty()) else {
        return Ok(validation_error("messages is required"));
    };
    let model = request.model.as_deref().unwrap_or(GLM_VISION_MODEL);
    info!(model, turns = messages.len(), "GLM vision request");

    match state.glm.vision_chat(&messages, model).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct QwenChatRequest {
    pub content: Option<String>,
    pub system_role: Option<String>,
    pub model: Option<String>,
}

/// POST /api/qwen/chat
pub async fn qwen_chat(
    state: web::Data<AppState>,
    request: web::Json<QwenChatRequest>,
) -> Result<HttpResponse, GatewayError> {
    let request = request.into_inner();
    let content = request
        .content
        .filter(|t| !t.trim().is_empty())
        .ok_or(GatewayError::EmptyInput)?;
    let system_role = request.system_role.as_deref().unwrap_or(QWEN_CHAT_SYSTEM_ROLE);
    let model = request.model.as_deref().unwrap_or(QWEN_CHAT_MODEL);
    info!(model, "Qwen chat request");

    let reply = state.qwen.chat(&content, system_role, model).await?;
    Ok(HttpResponse::Ok().json(json!({"text": reply})))
}

#[derive(Debug, Deserialize)]
pub struct QwenVlRequest {
    /// Base64-encoded image bytes, without a data-URI prefix
    pub file: Option<String>,
    pub text: Option<String>,
    pub model: Option<String>,
}

/// POST /api/qwen/vl
pub async fn qwen_vl(
    state: web::Data<AppState>,
    request: web::Json<QwenVlRequest>,
) -> Result<HttpResponse, GatewayError> {
    let request = request.into_inner();
    let file = request
        .file
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| GatewayError::validation("图片数据必填"))?;
    let model = request.model.as_deref().unwrap_or("qwen-vl-max-latest");

    let data_uri = format!("data:image/jpeg;base64,{}", file);
    let reply = state
        .qwen
        .vision_chat(&data_uri, request.text.as_deref(), model)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"text": reply})))
}

#[derive(Debug, Deserialize)]
pub struct CozeChatRequest {
    pub question: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/coze/chat
pub async fn coze_chat(
    state: web::Data<AppState>,
    request: web::Json<CozeChatRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    let Some(question) = request.question.filter(|q| !q.trim().is_empty()) else {
        return Ok(validation_error("question is required"));
    };
    let Some(user_id) = request.user_id.filter(|u| !u.trim().is_empty()) else {
        return Ok(validation_error("user_id is required"));
    };
    info!(user_id = %user_id, "Coze chat request");

    match state.coze.chat(&question, &user_id).await {
        Ok(result) => Ok(HttpResponse::Ok().json(json!({
            "content": result.content,
            "token_count": result.token_count,
        }))),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}
