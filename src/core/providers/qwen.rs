//! Qwen / DashScope adapter
//!
//! Talks to two distinct API surfaces of the same vendor:
//!
//! - the native DashScope API (`/services/aigc/...`, `/apps/{id}/completion`)
//!   for plain chat, audio understanding and agent applications;
//! - the OpenAI-compatible mode (`/chat/completions`) for vision chat, OCR
//!   and the streaming omni model.
//!
//! Agent application calls carry the provider-issued session token so the
//! vendor side replays prior turns; the gateway only stores the token.

use super::{build_http_client, build_streaming_client, ProviderError};
use crate::config::QwenConfig;
use crate::core::conversation::{AgentBackend, AgentReply};
use crate::core::types::StreamChunk;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace, warn};

const PROVIDER: &str = "qwen";

/// System prompt for the vision counselling endpoint
const VISION_SYSTEM_PROMPT: &str =
    "你是一位心理学专家，请分析图片中人物的情绪状态，并给出温暖、专业的建议。";

/// Default OCR instruction when the caller supplies none
pub const OCR_DEFAULT_QUESTION: &str = "提取所有图中文字";

// qwen-vl-ocr resolution window, in pixels (28x28 patches)
const OCR_MIN_PIXELS: u32 = 28 * 28 * 4;
const OCR_MAX_PIXELS: u32 = 28 * 28 * 1280;

const OMNI_MODEL: &str = "qwen-omni-turbo";
const LONG_DOCUMENT_MODEL: &str = "qwen-long";

/// Output of one agent application call
#[derive(Debug, Clone)]
pub struct AppOutput {
    pub text: String,
    /// Provider-issued session token, echoed back on every call
    pub session_id: Option<String>,
    /// Reasoning trace, present when requested with `has_thoughts`
    pub thoughts: Option<Value>,
}

/// DashScope error envelope: `{"code": ..., "message": ..., "request_id": ...}`
#[derive(Debug, Deserialize)]
struct DashScopeError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

/// HTTP client for Qwen / DashScope
#[derive(Debug, Clone)]
pub struct QwenClient {
    http: reqwest::Client,
    streaming_http: reqwest::Client,
    api_base: String,
    compat_base: String,
    api_key: String,
}

impl QwenClient {
    pub fn new(config: &QwenConfig, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_http_client(PROVIDER, timeout)?,
            streaming_http: build_streaming_client(PROVIDER, timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            compat_base: config.compat_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Single-turn chat through the native text-generation endpoint
    pub async fn chat(
        &self,
        text: &str,
        system_role: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": model,
            "input": {
                "messages": [
                    {"role": "system", "content": system_role},
                    {"role": "user", "content": text},
                ]
            },
            "parameters": {"result_format": "message"},
        });
        let url = format!("{}/services/aigc/text-generation/generation", self.api_base);
        let response = self.post_json(&url, &body).await?;

        response["output"]["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing chat content"))
    }

    /// Emotion analysis of a single image through compatible mode
    pub async fn vision_chat(
        &self,
        image_data_uri: &str,
        question: Option<&str>,
        model: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": model,
            "messages": [
                {
                    "role": "system",
                    "content": [{"type": "text", "text": VISION_SYSTEM_PROMPT}],
                },
                {
                    "role": "user",
                    "content": [
                        {"type": "image_url", "image_url": {"url": image_data_uri}},
                        {"type": "text", "text": question.unwrap_or("请分析这张图片")},
                    ],
                },
            ],
        });
        let url = format!("{}/chat/completions", self.compat_base);
        let response = self.post_json(&url, &body).await?;
        Self::compat_content(&response)
    }

    /// Text extraction from an image with the dedicated OCR model
    pub async fn ocr(
        &self,
        image_data_uri: &str,
        question: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": "qwen-vl-ocr",
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {"url": image_data_uri},
                        "min_pixels": OCR_MIN_PIXELS,
                        "max_pixels": OCR_MAX_PIXELS,
                    },
                    {"type": "text", "text": question},
                ],
            }],
        });
        let url = format!("{}/chat/completions", self.compat_base);
        let response = self.post_json(&url, &body).await?;
        Self::compat_content(&response)
    }

    /// Audio understanding through the native multimodal endpoint
    ///
    /// The model replies with a list of content items; all `text` items are
    /// concatenated into the returned string.
    pub async fn audio_chat(
        &self,
        audio_data_uri: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": "qwen-audio-turbo-latest",
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        {"audio": audio_data_uri},
                        {"text": prompt},
                    ],
                }]
            },
        });
        let url = format!(
            "{}/services/aigc/multimodal-generation/generation",
            self.api_base
        );
        let response = self.post_json(&url, &body).await?;

        let items = response["output"]["choices"][0]["message"]["content"]
            .as_array()
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing audio content list"))?;
        let combined: String = items
            .iter()
            .filter_map(|item| item["text"].as_str())
            .collect();
        if combined.is_empty() {
            return Err(ProviderError::protocol(PROVIDER, "empty audio reply"));
        }
        Ok(combined)
    }

    /// Question answering over an uploaded document
    ///
    /// Uploads the document to the compatible-mode file store for extraction,
    /// then asks the long-context model with the provider-issued file id as
    /// the system turn.
    pub async fn long_document_chat(
        &self,
        filename: &str,
        data: Vec<u8>,
        question: &str,
    ) -> Result<String, ProviderError> {
        let file_id = self.upload_for_extraction(filename, data).await?;
        debug!(file_id = %file_id, "document uploaded for extraction");

        let body = json!({
            "model": LONG_DOCUMENT_MODEL,
            "messages": [
                {"role": "system", "content": format!("fileid://{}", file_id)},
                {"role": "user", "content": question},
            ],
        });
        let url = format!("{}/chat/completions", self.compat_base);
        let response = self.post_json(&url, &body).await?;
        Self::compat_content(&response)
    }

    async fn upload_for_extraction(
        &self,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<String, ProviderError> {
        let part = reqwest::multipart::Part::bytes(data).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("purpose", "file-extract");
        let url = format!("{}/files", self.compat_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(decode_error_body(status, &bytes));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("invalid JSON: {}", e)))?;
        value["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing file id in upload reply"))
    }

    /// One turn against an agent application
    ///
    /// With `session_id = None` the provider opens a new session; the token
    /// it returns keys all later turns.
    pub async fn app_call(
        &self,
        app_id: &str,
        prompt: &str,
        session_id: Option<&str>,
        has_thoughts: bool,
    ) -> Result<AppOutput, ProviderError> {
        let mut input = json!({"prompt": prompt});
        if let Some(session_id) = session_id {
            input["session_id"] = json!(session_id);
        }
        let body = json!({
            "input": input,
            "parameters": {"has_thoughts": has_thoughts},
        });
        let url = format!("{}/apps/{}/completion", self.api_base, app_id);
        debug!(app_id, resumed = session_id.is_some(), "agent app call");
        let response = self.post_json(&url, &body).await?;

        let output = &response["output"];
        let text = output["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing output.text"))?;
        let session_id = output["session_id"].as_str().map(str::to_string);
        let thoughts = match &output["thoughts"] {
            Value::Null => None,
            other => Some(other.clone()),
        };
        Ok(AppOutput {
            text,
            session_id,
            thoughts,
        })
    }

    /// Streaming multimodal chat with the omni model
    ///
    /// Returns a lazy chunk stream; nothing is sent until it is polled. Text
    /// deltas, audio transcripts and base64 audio frames are surfaced in
    /// provider-emission order.
    pub fn omni_stream(
        &self,
        messages: Vec<Value>,
        voice: &str,
    ) -> impl Stream<Item = Result<StreamChunk, ProviderError>> {
        let body = json!({
            "model": OMNI_MODEL,
            "messages": messages,
            "modalities": ["text", "audio"],
            "audio": {"voice": voice, "format": "wav"},
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        let url = format!("{}/chat/completions", self.compat_base);
        let http = self.streaming_http.clone();
        let api_key = self.api_key.clone();

        async_stream::try_stream! {
            let response = open_stream(&http, &url, &api_key, &body).await?;

            let mut parser = OmniStreamParser::new();
            let mut byte_stream = response.bytes_stream();
            while let Some(piece) = byte_stream.next().await {
                let piece = piece.map_err(transport_error)?;
                for chunk in parser.feed(&piece)? {
                    yield chunk;
                }
                if parser.finished() {
                    break;
                }
            }
        }
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(decode_error_body(status, &bytes));
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::protocol(PROVIDER, format!("invalid JSON: {}", e)))
    }

    /// Extract `choices[0].message.content` from a compatible-mode response
    fn compat_content(response: &Value) -> Result<String, ProviderError> {
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing completion content"))
    }
}

/// One named agent application, exposed as a conversation backend
///
/// Binds a `QwenClient` to a specific application id. Session init is an
/// empty-prompt call whose only purpose is obtaining the provider token;
/// its reply text is dropped.
#[derive(Debug, Clone)]
pub struct QwenAgentApp {
    client: QwenClient,
    app_id: String,
    name: String,
}

impl QwenAgentApp {
    pub fn new<N: Into<String>, A: Into<String>>(client: QwenClient, name: N, app_id: A) -> Self {
        Self {
            client,
            app_id: app_id.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl AgentBackend for QwenAgentApp {
    fn app_name(&self) -> &str {
        &self.name
    }

    fn configured(&self) -> bool {
        !self.client.api_key.is_empty() && !self.app_id.is_empty()
    }

    async fn init_session(&self) -> Result<String, ProviderError> {
        let output = self.client.app_call(&self.app_id, "", None, false).await?;
        output
            .session_id
            .ok_or_else(|| ProviderError::protocol(PROVIDER, "missing session_id in init reply"))
    }

    async fn send_turn(
        &self,
        token: &str,
        content: &str,
        with_thoughts: bool,
    ) -> Result<AgentReply, ProviderError> {
        let output = self
            .client
            .app_call(&self.app_id, content, Some(token), with_thoughts)
            .await?;
        Ok(AgentReply {
            text: output.text,
            thoughts: output.thoughts,
        })
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::transport(PROVIDER, e.to_string())
}

/// Open a streaming request, surfacing non-success statuses as errors
async fn open_stream(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &Value,
) -> Result<reqwest::Response, ProviderError> {
    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let bytes = response.bytes().await.map_err(transport_error)?;
    Err(decode_error_body(status, &bytes))
}

fn decode_error_body(status: reqwest::StatusCode, bytes: &[u8]) -> ProviderError {
    if let Ok(envelope) = serde_json::from_slice::<DashScopeError>(bytes) {
        if envelope.code.is_some() || envelope.message.is_some() {
            return ProviderError::upstream(
                PROVIDER,
                envelope.request_id,
                envelope.code.unwrap_or_else(|| status.as_u16().to_string()),
                envelope
                    .message
                    .unwrap_or_else(|| "unknown DashScope error".to_string()),
            );
        }
    }
    ProviderError::upstream(
        PROVIDER,
        None,
        status.as_u16().to_string(),
        String::from_utf8_lossy(bytes).into_owned(),
    )
}

/// Incremental SSE parser for omni completion streams
///
/// Bytes arrive in arbitrary fragments; the parser buffers until it has a
/// complete `data: ` line, then pulls text deltas, audio transcripts and
/// base64 audio frames out of the event payload. `data: [DONE]` marks clean
/// exhaustion.
struct OmniStreamParser {
    buffer: String,
    done: bool,
}

impl OmniStreamParser {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            done: false,
        }
    }

    fn finished(&self) -> bool {
        self.done
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamChunk>, ProviderError> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut chunks = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                self.done = true;
                break;
            }

            let event: Value = serde_json::from_str(data).map_err(|e| {
                ProviderError::protocol(PROVIDER, format!("bad stream event: {}", e))
            })?;
            let delta = &event["choices"][0]["delta"];
            if delta.is_null() {
                // Trailing usage-only event
                trace!("usage event: {}", data);
                continue;
            }
            if let Some(text) = delta["content"].as_str() {
                if !text.is_empty() {
                    chunks.push(StreamChunk::Text(text.to_string()));
                }
            }
            if let Some(transcript) = delta["audio"]["transcript"].as_str() {
                if !transcript.is_empty() {
                    chunks.push(StreamChunk::Text(transcript.to_string()));
                }
            }
            if let Some(audio) = delta["audio"]["data"].as_str() {
                chunks.push(StreamChunk::Audio(audio.to_string()));
            }
        }

        if !self.done && self.buffer.len() > 1 << 20 {
            warn!("stream line exceeded 1 MiB without newline");
            return Err(ProviderError::protocol(PROVIDER, "oversized stream line"));
        }
        Ok(chunks)
    }
}
