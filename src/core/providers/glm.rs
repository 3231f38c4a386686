//! Zhipu GLM adapter
//!
//! Chat completions (GLM-4), vision chat (GLM-4V), text-to-image (CogView),
//! asynchronous text-to-video (CogVideoX: generate returns a task id, a
//! separate status call polls for the result) and speech dialogue
//! (GLM-4-Voice). Chat-style endpoints pass the provider's completion JSON
//! through unchanged; video and voice responses are reshaped into typed
//! structs.

use super::{build_http_client, ProviderError};
use crate::config::GlmConfig;
use crate::core::types::ConversationTurn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "glm";

/// Retrieval prompt template sent with single-turn chat requests
const RETRIEVAL_PROMPT_TEMPLATE: &str = "从\n\"\"\"\n{{knowledge}}\n\"\"\"\n中找问题\n\"\"\"\n{{question}}\n\"\"\"\n的答案，如果有对应的答案则用内容回复，没有找到的话就用最有温度的聊天和我对话，不要重复直接回答";

/// Video generation request options
#[derive(Debug, Clone, Serialize)]
pub struct VideoGenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub quality: String,
    pub with_audio: bool,
    pub size: String,
    pub fps: u32,
}

/// Newly submitted video generation task
#[derive(Debug, Clone, Deserialize)]
pub struct VideoTask {
    #[serde(rename = "id")]
    pub task_id: String,
}

/// One finished video artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
}

/// Polled state of a video generation task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStatus {
    pub task_status: String,
    #[serde(default)]
    pub video_result: Vec<VideoResult>,
}

/// Voice chat request options
#[derive(Debug, Clone)]
pub struct VoiceChatRequest {
    pub model: String,
    pub messages: Vec<ConversationTurn>,
    pub do_sample: bool,
    pub stream: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stop: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

/// Reshaped voice completion: only the documented fields survive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceChatResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<VoiceChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<VoiceUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceChoice {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub message: VoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Synthesized audio payload, present when the model produced speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// GLM error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Deserialize)]
struct GlmErrorEnvelope {
    error: GlmErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GlmErrorDetail {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the GLM open platform
#[derive(Debug, Clone)]
pub struct GlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GlmClient {
    pub fn new(config: &GlmConfig, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http_client(PROVIDER, timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Single-turn chat with the retrieval tool attached
    pub async fn chat(&self, question: &str, model: &str) -> Result<Value, ProviderError> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": question}],
            "tools": [{
                "type": "retrieval",
                "retrieval": {
                    "knowledge_id": " ",
                    "prompt_template": RETRIEVAL_PROMPT_TEMPLATE,
                }
            }],
        });
        self.post_json("/chat/completions", &body).await
    }

    /// Vision chat: caller-supplied multimodal messages are sent as-is
    pub async fn vision_chat(
        &self,
        messages: &[ConversationTurn],
        model: &str,
    ) -> Result<Value, ProviderError> {
        let body = json!({
            "model": model,
            "messages": messages,
        });
        self.post_json("/chat/completions", &body).await
    }

    /// Text-to-image generation
    pub async fn generate_image(
        &self,
        prompt: &str,
        model: &str,
        size: &str,
        user_id: Option<&str>,
    ) -> Result<Value, ProviderError> {
        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "size": size,
        });
        if let Some(user_id) = user_id {
            body["user_id"] = Value::String(user_id.to_string());
        }
        self.post_json("/images/generations", &body).await
    }

    /// Submit an asynchronous video generation task
    pub async fn generate_video(
        &self,
        request: &VideoGenerationRequest,
    ) -> Result<VideoTask, ProviderError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ProviderError::protocol(PROVIDER, e.to_string()))?;
        let response = self.post_json("/videos/generations", &body).await?;
        serde_json::from_value(response)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("task response: {}", e)))
    }

    /// Poll a previously submitted video generation task
    pub async fn video_status(&self, task_id: &str) -> Result<VideoStatus, ProviderError> {
        let url = format!("{}/async-result/{}", self.api_base, task_id);
        debug!(task_id, "polling GLM video task");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let value = Self::decode(response).await?;
        serde_json::from_value(value)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("status response: {}", e)))
    }

    /// Speech dialogue with GLM-4-Voice, reshaped to the documented fields
    pub async fn voice_chat(
        &self,
        request: &VoiceChatRequest,
    ) -> Result<VoiceChatResponse, ProviderError> {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "do_sample": request.do_sample,
            "stream": request.stream,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "max_tokens": request.max_tokens,
        });
        if let Some(stop) = &request.stop {
            body["stop"] = json!(stop);
        }
        if let Some(user_id) = &request.user_id {
            body["user_id"] = json!(user_id);
        }
        if let Some(request_id) = &request.request_id {
            body["request_id"] = json!(request_id);
        }

        let response = self.post_json("/chat/completions", &body).await?;
        serde_json::from_value(response)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("voice response: {}", e)))
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::decode(response).await
    }

    /// Decode a GLM response, mapping non-success statuses to upstream errors
    async fn decode(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_slice::<GlmErrorEnvelope>(&bytes) {
                let code = match envelope.error.code {
                    Some(Value::String(s)) => s,
                    Some(Value::Number(n)) => n.to_string(),
                    _ => status.as_u16().to_string(),
                };
                let message = envelope
                    .error
                    .message
                    .unwrap_or_else(|| "unknown GLM error".to_string());
                return Err(ProviderError::upstream(PROVIDER, None, code, message));
            }
            return Err(ProviderError::upstream(
                PROVIDER,
                None,
                status.as_u16().to_string(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("invalid JSON: {}", e)))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::transport(PROVIDER, e.to_string())
}
