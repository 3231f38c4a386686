//! Core gateway logic
//!
//! Conversation/session continuity and the streaming multimodal relay,
//! plus the provider adapters they are built on.

pub mod conversation;
pub mod providers;
pub mod relay;
pub mod session;
pub mod types;

pub use conversation::{AgentBackend, AgentReply, ConversationGateway};
pub use relay::{OmniRelay, DONE_LINE};
pub use session::SessionStore;
pub use types::{ContentPart, ConversationTurn, MessageRole, StreamChunk, TurnContent};
