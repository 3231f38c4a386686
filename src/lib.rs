//! # Omnigate
//!
//! A backend AI gateway exposing a uniform HTTP API over the GLM, Qwen /
//! DashScope and Coze provider APIs.
//!
//! ## Features
//!
//! - **Multi-Provider**: GLM chat/vision/image/video/voice, Qwen
//!   chat/vision/OCR/audio, Coze bot chat
//! - **Session Continuity**: multi-turn agent conversations keyed on an
//!   explicit `x-session-id` header
//! - **Streaming Relay**: the omni endpoint forwards text and audio chunks
//!   as line-delimited tagged records while folding them into the session's
//!   dialog history
//! - **Media Library**: local file uploads with extension-based
//!   classification
//!
//! ## Gateway Mode
//!
//! ```rust,no_run
//! use omnigate::{Config, HttpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config/gateway.yaml").await?;
//!     HttpServer::new(&config)?.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::conversation::{AgentBackend, AgentReply, ConversationGateway};
pub use crate::core::relay::{OmniRelay, DONE_LINE};
pub use crate::core::session::SessionStore;
pub use crate::server::{AppState, HttpServer};
pub use crate::storage::{FileCategory, FileRecord, MediaStore};
pub use crate::utils::error::{GatewayError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
