//! Conversation data model
//!
//! Typed request/response schemas shared by the conversation gateway and the
//! provider adapters. Content parts serialize in the OpenAI-compatible wire
//! shape the providers expect (`{"type": "image_url", "image_url": {...}}`),
//! so a `ConversationTurn` can be sent to a provider verbatim.

use serde::{Deserialize, Serialize};

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A remote or data-URI media reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    pub url: String,
}

/// Inline audio payload (base64 data URI or remote URL) with its format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioData {
    pub data: String,
    pub format: String,
}

/// One typed element of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: MediaUrl },
    InputAudio { input_audio: AudioData },
    VideoUrl { video_url: MediaUrl },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        Self::ImageUrl {
            image_url: MediaUrl { url: url.into() },
        }
    }

    pub fn input_audio<D: Into<String>, F: Into<String>>(data: D, format: F) -> Self {
        Self::InputAudio {
            input_audio: AudioData {
                data: data.into(),
                format: format.into(),
            },
        }
    }

    pub fn video_url<S: Into<String>>(url: S) -> Self {
        Self::VideoUrl {
            video_url: MediaUrl { url: url.into() },
        }
    }
}

/// Turn content: plain text or a list of typed parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One message within a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn system_text<S: Into<String>>(text: S) -> Self {
        Self {
            role: MessageRole::System,
            content: TurnContent::Parts(vec![ContentPart::text(text)]),
        }
    }

    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self {
            role: MessageRole::User,
            content: TurnContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: TurnContent::Parts(parts),
        }
    }

    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: TurnContent::Parts(parts),
        }
    }
}

/// One element of a provider's streaming response
///
/// Chunks form a lazy, finite, non-restartable sequence and are forwarded to
/// the caller strictly in provider-emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental text (or audio transcript)
    Text(String),
    /// Base64-encoded audio fragment
    Audio(String),
}

impl StreamChunk {
    /// Encode as the line-delimited tagged record sent to the caller
    pub fn encode_line(&self) -> String {
        match self {
            Self::Text(text) => format!("text:{}\n", text),
            Self::Audio(data) => format!("audio:{}\n", data),
        }
    }

    /// Fold the chunk into a content part for the accumulated assistant turn
    pub fn into_part(self) -> ContentPart {
        match self {
            Self::Text(text) => ContentPart::text(text),
            Self::Audio(data) => ContentPart::input_audio(data, "wav"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_parts_serialize_in_provider_wire_shape() {
        let part = ContentPart::image_url("https://example.com/cat.png");
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}})
        );

        let part = ContentPart::input_audio("data:;base64,Zm9v", "mp3");
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({"type": "input_audio", "input_audio": {"data": "data:;base64,Zm9v", "format": "mp3"}})
        );
    }

    #[test]
    fn turn_content_accepts_plain_text_and_part_lists() {
        let turn: ConversationTurn = serde_json::from_value(json!({
            "role": "user",
            "content": "你好"
        }))
        .unwrap();
        assert_eq!(turn.content, TurnContent::Text("你好".to_string()));

        let turn: ConversationTurn = serde_json::from_value(json!({
            "role": "user",
            "content": [{"type": "text", "text": "hi"}]
        }))
        .unwrap();
        assert!(matches!(turn.content, TurnContent::Parts(ref p) if p.len() == 1));
    }

    #[test]
    fn stream_chunks_encode_as_tagged_lines() {
        assert_eq!(StreamChunk::Text("Hello".into()).encode_line(), "text:Hello\n");
        assert_eq!(StreamChunk::Audio("Zm9v".into()).encode_line(), "audio:Zm9v\n");
    }
}
