//! Multi-turn conversation endpoints
//!
//! All three endpoints key their state on the `x-session-id` header. A
//! request without the header starts a fresh conversation; the resolved id
//! is echoed back so the client can pin it on subsequent turns.
//!
//! `/chat/multi-turn` and `/chat/deep-think` delegate to the conversation
//! gateway (provider-side history replay). `/qwen/omni` keeps its history
//! locally and streams the reply as line-delimited tagged records.

use crate::core::types::{ContentPart, ConversationTurn};
use crate::server::state::AppState;
use crate::server::utils::{read_multipart, resolve_session_id, MultipartForm, SESSION_HEADER};
use crate::utils::error::GatewayError;
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Seed turn for a fresh omni conversation
const OMNI_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    pub content: Option<String>,
    /// Deep-think only: whether to request the reasoning trace
    pub has_thoughts: Option<bool>,
}

/// POST /api/chat/multi-turn
pub async fn multi_turn(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<TurnBody>,
) -> Result<HttpResponse, GatewayError> {
    let session_id = resolve_session_id(&req);
    let content = body.into_inner().content.unwrap_or_default();

    let reply = state
        .chat_agent
        .submit_turn(&session_id, &content, false)
        .await?;
    Ok(HttpResponse::Ok()
        .insert_header((SESSION_HEADER, session_id))
        .json(json!({"text": reply.text})))
}

/// POST /api/chat/deep-think
///
/// Same conversation contract as multi-turn, with the agent's reasoning
/// trace included in the reply.
pub async fn deep_think(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<TurnBody>,
) -> Result<HttpResponse, GatewayError> {
    let session_id = resolve_session_id(&req);
    let body = body.into_inner();
    let content = body.content.unwrap_or_default();
    let has_thoughts = body.has_thoughts.unwrap_or(true);

    let reply = state
        .deepthink_agent
        .submit_turn(&session_id, &content, has_thoughts)
        .await?;
    let mut response = json!({"text": reply.text});
    if let Some(thoughts) = reply.thoughts {
        response["thoughts"] = thoughts;
    }
    Ok(HttpResponse::Ok()
        .insert_header((SESSION_HEADER, session_id))
        .json(response))
}

/// POST /api/qwen/omni
///
/// Multipart: `type` selects the input kind (`text`, `image`, `audio`,
/// `video`), `text` carries the prompt, `voice` the reply voice. Media
/// arrives either inline as `file` or by reference as `url`. The response
/// streams `text:` / `audio:` records and ends with `done:` on success.
pub async fn omni(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: Multipart,
) -> Result<HttpResponse, GatewayError> {
    let session_id = resolve_session_id(&req);
    let form = read_multipart(payload).await?;

    let text = form.field("text").unwrap_or_default().trim().to_string();
    let kind = form.field("type").unwrap_or("text").to_string();
    // Only pure text turns need a prompt; media turns may arrive without one
    if kind == "text" && text.is_empty() {
        return Err(GatewayError::EmptyInput);
    }
    let voice = form
        .field("voice")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(&state.config.providers.qwen.default_voice)
        .to_string();

    let user_turn = build_user_turn(&form, &kind, text)?;

    // Fresh conversations get the seed system turn before anything else
    if state.sessions.history_len(&session_id) == 0 {
        state
            .sessions
            .append_history(&session_id, ConversationTurn::system_text(OMNI_SYSTEM_PROMPT));
    }

    // Snapshot history plus the new turn for the provider call; the relay
    // appends the turn to the stored history itself
    let mut messages: Vec<serde_json::Value> = state
        .sessions
        .history(&session_id)
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()?;
    messages.push(serde_json::to_value(&user_turn)?);

    info!(session_id = %session_id, turns = messages.len(), voice = %voice, "omni stream request");

    let upstream = state.qwen.omni_stream(messages, &voice);
    let body = state.relay.relay(&session_id, user_turn, upstream);

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((SESSION_HEADER, session_id))
        .streaming(body))
}

/// Assemble the user turn from the declared input kind
///
/// Inline files become base64 data URIs; `url` passes straight through.
/// Unknown kinds fall back to text-only. A media turn without a prompt
/// carries the media part alone.
fn build_user_turn(
    form: &MultipartForm,
    kind: &str,
    text: String,
) -> Result<ConversationTurn, GatewayError> {
    if kind == "text" {
        return Ok(ConversationTurn::user_parts(vec![ContentPart::text(text)]));
    }

    let media_ref = if let Some(file) = form.file("file") {
        let mime = crate::storage::detect_mime(&file.filename);
        format!("data:{};base64,{}", mime, BASE64.encode(&file.data))
    } else if let Some(url) = form.field("url").filter(|u| !u.trim().is_empty()) {
        url.to_string()
    } else {
        return Err(GatewayError::validation(format!(
            "{} input requires a file or url",
            kind
        )));
    };

    let media_part = match kind {
        "image" => ContentPart::image_url(media_ref),
        "audio" => ContentPart::input_audio(media_ref, "wav"),
        "video" => ContentPart::video_url(media_ref),
        _ => ContentPart::text(media_ref),
    };
    let mut parts = vec![media_part];
    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }
    Ok(ConversationTurn::user_parts(parts))
}
