//! Coze bot adapter
//!
//! Coze's v3 chat API only answers over SSE. The adapter consumes the whole
//! event stream internally, accumulating `conversation.message.delta` answer
//! fragments, and returns a single aggregated reply once
//! `conversation.chat.completed` arrives with the token count.

use super::{build_streaming_client, ProviderError};
use crate::config::CozeConfig;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

const PROVIDER: &str = "coze";

/// Aggregated result of one bot conversation turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CozeChatResult {
    pub content: String,
    pub token_count: u64,
}

/// Coze error envelope: `{"code": ..., "msg": ...}` with non-zero code
#[derive(Debug, Deserialize)]
struct CozeErrorEnvelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP client for the Coze bot platform
#[derive(Debug, Clone)]
pub struct CozeClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    bot_id: String,
}

impl CozeClient {
    pub fn new(config: &CozeConfig, connect_timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_streaming_client(PROVIDER, connect_timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            bot_id: config.bot_id.clone(),
        })
    }

    /// One question against the configured bot, aggregated from the stream
    pub async fn chat(&self, question: &str, user_id: &str) -> Result<CozeChatResult, ProviderError> {
        let body = json!({
            "bot_id": self.bot_id,
            "user_id": user_id,
            "stream": true,
            "auto_save_history": true,
            "additional_messages": [{
                "role": "user",
                "content": question,
                "content_type": "text",
            }],
        });
        let url = format!("{}/v3/chat", self.api_base);
        debug!(user_id, "starting Coze chat stream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.map_err(transport_error)?;
            return Err(decode_error_body(status, &bytes));
        }

        let mut accumulator = EventAccumulator::new();
        let mut byte_stream = response.bytes_stream();
        while let Some(piece) = byte_stream.next().await {
            let piece = piece.map_err(transport_error)?;
            accumulator.feed(&piece)?;
            if accumulator.completed() {
                break;
            }
        }
        accumulator.finish()
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::transport(PROVIDER, e.to_string())
}

fn decode_error_body(status: reqwest::StatusCode, bytes: &[u8]) -> ProviderError {
    if let Ok(envelope) = serde_json::from_slice::<CozeErrorEnvelope>(bytes) {
        if let Some(code) = envelope.code.filter(|c| *c != 0) {
            return ProviderError::upstream(
                PROVIDER,
                None,
                code.to_string(),
                envelope.msg.unwrap_or_else(|| "unknown Coze error".to_string()),
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

/// Folds the Coze SSE event stream into one aggregated answer
///
/// Coze events are `event:` / `data:` line pairs. Answer-type message deltas
/// carry the incremental reply text; the chat.completed event carries usage.
struct EventAccumulator {
    buffer: String,
    current_event: Option<String>,
    content: String,
    token_count: Option<u64>,
    completed: bool,
}

impl EventAccumulator {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            current_event: None,
            content: String::new(),
            token_count: None,
            completed: false,
        }
    }

    fn completed(&self) -> bool {
        self.completed
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<(), ProviderError> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);

            if let Some(event) = line.strip_prefix("event:") {
                self.current_event = Some(event.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.handle_data(data.trim())?;
            }
            // Blank separator lines fall through
        }
        Ok(())
    }

    fn handle_data(&mut self, data: &str) -> Result<(), ProviderError> {
        let Some(event) = self.current_event.as_deref() else {
            return Ok(());
        };
        match event {
            "conversation.message.delta" => {
                let message: Value = serde_json::from_str(data).map_err(|e| {
                    ProviderError::protocol(PROVIDER, format!("bad delta event: {}", e))
                })?;
                // Only the bot's answer stream contributes to the reply;
                // follow-up suggestions and tool traces are skipped
                if message["type"].as_str().unwrap_or("answer") == "answer" {
                    if let Some(piece) = message["content"].as_str() {
                        self.content.push_str(piece);
                    }
                }
            }
            "conversation.chat.completed" => {
                let chat: Value = serde_json::from_str(data).map_err(|e| {
                    ProviderError::protocol(PROVIDER, format!("bad completed event: {}", e))
                })?;
                self.token_count = chat["usage"]["token_count"].as_u64();
                self.completed = true;
            }
            "conversation.chat.failed" => {
                let chat: Value = serde_json::from_str(data).unwrap_or(Value::Null);
                let code = chat["last_error"]["code"]
                    .as_i64()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let message = chat["last_error"]["msg"]
                    .as_str()
                    .unwrap_or("bot conversation failed")
                    .to_string();
                return Err(ProviderError::upstream(PROVIDER, None, code, message));
            }
            other => trace!(event = other, "ignoring Coze event"),
        }
        Ok(())
    }

    fn finish(self) -> Result<CozeChatResult, ProviderError> {
        if !self.completed {
            return Err(ProviderError::protocol(
                PROVIDER,
                "stream ended before chat.completed",
            ));
        }
        Ok(CozeChatResult {
            content: self.content,
            token_count: self.token_count.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CozeClient {
        CozeClient::new(
            &CozeConfig {
                api_token: "pat-test".to_string(),
                bot_id: "bot-1".to_string(),
                api_base: server.uri(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn chat_accumulates_answer_deltas_and_token_count() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "event:conversation.chat.created\n",
            "data:{\"id\":\"chat-1\",\"status\":\"created\"}\n\n",
            "event:conversation.message.delta\n",
            "data:{\"type\":\"answer\",\"content\":\"今天\"}\n\n",
            "event:conversation.message.delta\n",
            "data:{\"type\":\"answer\",\"content\":\"晴天\"}\n\n",
            "event:conversation.message.completed\n",
            "data:{\"type\":\"follow_up\",\"content\":\"明天呢?\"}\n\n",
            "event:conversation.chat.completed\n",
            "data:{\"id\":\"chat-1\",\"usage\":{\"token_count\":42}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .and(header("authorization", "Bearer pat-test"))
            .and(body_partial_json(serde_json::json!({
                "bot_id": "bot-1",
                "user_id": "u-9",
                "stream": true,
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server).chat("天气怎么样", "u-9").await.unwrap();
        assert_eq!(
            result,
            CozeChatResult {
                content: "今天晴天".to_string(),
                token_count: 42,
            }
        );
    }

    #[tokio::test]
    async fn failed_chat_event_maps_to_upstream_error() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "event:conversation.chat.failed\n",
            "data:{\"last_error\":{\"code\":4013,\"msg\":\"bot quota exceeded\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).chat("hi", "u-1").await.unwrap_err();
        match err {
            ProviderError::Upstream { code, message, .. } => {
                assert_eq!(code, "4013");
                assert_eq!(message, "bot quota exceeded");
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncated_stream_is_a_protocol_error() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "event:conversation.message.delta\n",
            "data:{\"type\":\"answer\",\"content\":\"partial\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("hi", "u-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Protocol { .. }));
    }

    #[tokio::test]
    async fn http_error_status_maps_to_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/chat"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": 700012006,
                "msg": "access token invalid",
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("hi", "u-1").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Upstream { code, .. } if code == "700012006"
        ));
    }

    #[test]
    fn accumulator_handles_events_split_across_fragments() {
        let mut acc = EventAccumulator::new();
        acc.feed(b"event:conversation.message.delta\ndata:{\"type\":\"answ")
            .unwrap();
        acc.feed(b"er\",\"content\":\"hi\"}\n\nevent:conversation.chat.completed\ndata:{\"usage\":{\"token_count\":3}}\n\n")
            .unwrap();
        assert!(acc.completed());
        let result = acc.finish().unwrap();
        assert_eq!(result.content, "hi");
        assert_eq!(result.token_count, 3);
    }
}
