//! Media generation and understanding endpoints
//!
//! Image/video generation and voice chat against GLM, plus OCR and audio
//! understanding against Qwen. The Qwen endpoints accept multipart uploads
//! and inline the file as a base64 data URI; nothing is persisted here.

use crate::core::providers::glm::{VideoGenerationRequest, VoiceChatRequest};
use crate::core::providers::qwen::OCR_DEFAULT_QUESTION;
use crate::core::providers::ProviderError;
use crate::core::types::ConversationTurn;
use crate::server::routes::{provider_unavailable, validation_error};
use crate::server::state::AppState;
use crate::server::utils::read_multipart;
use crate::storage::detect_mime;
use crate::utils::error::{ErrorBody, GatewayError};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result as ActixResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const IMAGE_MODEL: &str = "cogview-3";
const IMAGE_SIZE: &str = "1024x1024";
const VIDEO_MODEL: &str = "cogvideox-flash";
const VOICE_MODEL: &str = "glm-4-voice";

/// Largest accepted audio upload, in bytes
const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Instruction sent alongside an uploaded audio clip
const AUDIO_PROMPT: &str = "请听这段音频并用中文回应";

/// Default question for an uploaded document when the caller supplies none
const DOCUMENT_DEFAULT_QUESTION: &str = "总结这份文档的主要内容";

#[derive(Debug, Deserialize)]
pub struct ImageGenerationBody {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub size: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/glm/images
pub async fn glm_images(
    state: web::Data<AppState>,
    request: web::Json<ImageGenerationBody>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    let Some(prompt) = request.prompt.filter(|p| !p.trim().is_empty()) else {
        return Ok(validation_error("prompt is required"));
    };
    let model = request.model.as_deref().unwrap_or(IMAGE_MODEL);
    let size = request.size.as_deref().unwrap_or(IMAGE_SIZE);
    info!(model, size, "image generation request");

    match state
        .glm
        .generate_image(&prompt, model, size, request.user_id.as_deref())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct VideoBody {
    /// "generate" (default) or "check_status"
    pub action: Option<String>,
    pub task_id: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub image_url: Option<String>,
    pub quality: Option<String>,
    pub with_audio: Option<bool>,
    pub size: Option<String>,
    pub fps: Option<u32>,
}

/// POST /api/glm/videos
///
/// Dispatches on `action`: submitting a generation task returns its id,
/// checking status returns the task state and finished artifacts.
pub async fn glm_videos(
    state: web::Data<AppState>,
    request: web::Json<VideoBody>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();

    if request.action.as_deref() == Some("check_status") {
        let Some(task_id) = request.task_id.filter(|t| !t.trim().is_empty()) else {
            return Ok(validation_error("task_id is required"));
        };
        return match state.glm.video_status(&task_id).await {
            Ok(status) => Ok(HttpResponse::Ok().json(status)),
            Err(e) => Ok(provider_unavailable(&e)),
        };
    }

    let Some(prompt) = request.prompt.filter(|p| !p.trim().is_empty()) else {
        return Ok(validation_error("prompt is required"));
    };
    let generation = VideoGenerationRequest {
        model: request.model.unwrap_or_else(|| VIDEO_MODEL.to_string()),
        prompt,
        image_url: request.image_url,
        quality: request.quality.unwrap_or_else(|| "quality".to_string()),
        with_audio: request.with_audio.unwrap_or(true),
        size: request.size.unwrap_or_else(|| "720x480".to_string()),
        fps: request.fps.unwrap_or(30),
    };
    info!(model = %generation.model, "video generation request");

    match state.glm.generate_video(&generation).await {
        Ok(task) => Ok(HttpResponse::Ok().json(json!({"task_id": task.task_id}))),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct VoiceBody {
    pub messages: Option<Vec<ConversationTurn>>,
    pub model: Option<String>,
    pub do_sample: Option<bool>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

/// POST /api/glm/voice
pub async fn glm_voice(
    state: web::Data<AppState>,
    request: web::Json<VoiceBody>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();
    let Some(messages) = request.messages.filter(|m| !m.is_empty()) else {
        return Ok(validation_error("messages is required"));
    };

    let voice_request = VoiceChatRequest {
        model: request.model.unwrap_or_else(|| VOICE_MODEL.to_string()),
        messages,
        do_sample: request.do_sample.unwrap_or(true),
        stream: false,
        temperature: request.temperature.unwrap_or(0.8),
        top_p: request.top_p.unwrap_or(0.6),
        max_tokens: request.max_tokens.unwrap_or(1024),
        stop: request.stop,
        user_id: request.user_id,
        request_id: request.request_id,
    };
    info!(model = %voice_request.model, "voice chat request");

    match state.glm.voice_chat(&voice_request).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Ok(provider_unavailable(&e)),
    }
}

/// POST /api/qwen/ocr
///
/// Multipart: `file` (required image), `question` (optional instruction).
pub async fn qwen_ocr(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let form = read_multipart(payload).await?;
    let file = form
        .file("file")
        .ok_or_else(|| GatewayError::validation("未上传文件"))?;
    let question = form
        .field("question")
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(OCR_DEFAULT_QUESTION);
    info!(file = %file.filename, size = file.data.len(), "OCR request");

    let data_uri = format!(
        "data:{};base64,{}",
        detect_mime(&file.filename),
        BASE64.encode(&file.data)
    );
    let text = state.qwen.ocr(&data_uri, question).await?;
    Ok(HttpResponse::Ok().json(json!({"text": text})))
}

/// POST /api/qwen/document
///
/// Multipart: `file` (required document), `question` (optional instruction).
/// The document is uploaded to the provider for extraction and answered by
/// the long-context model.
pub async fn qwen_document(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let form = read_multipart(payload).await?;
    let file = form
        .file("file")
        .ok_or_else(|| GatewayError::validation("未上传文件"))?;
    let question = form
        .field("question")
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(DOCUMENT_DEFAULT_QUESTION);
    info!(file = %file.filename, size = file.data.len(), "document chat request");

    let text = state
        .qwen
        .long_document_chat(&file.filename, file.data.clone(), question)
        .await?;
    Ok(HttpResponse::Ok().json(json!({"text": text})))
}

/// POST /api/qwen/audio
///
/// Multipart: `file` (required clip, at most 10 MB).
pub async fn qwen_audio(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let form = read_multipart(payload).await?;
    let file = form
        .file("file")
        .ok_or_else(|| GatewayError::validation("未提供音频文件"))?;
    if file.data.len() > MAX_AUDIO_BYTES {
        return Err(GatewayError::validation("音频文件不能超过10MB"));
    }
    info!(file = %file.filename, size = file.data.len(), "audio chat request");

    let data_uri = format!(
        "data:{};base64,{}",
        detect_mime(&file.filename),
        BASE64.encode(&file.data)
    );
    match state.qwen.audio_chat(&data_uri, AUDIO_PROMPT).await {
        Ok(text) => Ok(HttpResponse::Ok().json(json!({"text": text}))),
        Err(ProviderError::Upstream { message, .. }) => {
            Ok(HttpResponse::ServiceUnavailable().json(ErrorBody {
                error: "音频处理服务暂时不可用".to_string(),
                code: None,
                request_id: None,
                message: Some(message),
            }))
        }
        Err(e) => Err(e.into()),
    }
}
