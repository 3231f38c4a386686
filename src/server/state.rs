//! Application state shared across HTTP handlers

use crate::config::Config;
use crate::core::conversation::ConversationGateway;
use crate::core::providers::{CozeClient, GlmClient, QwenAgentApp, QwenClient};
use crate::core::relay::OmniRelay;
use crate::core::session::SessionStore;
use crate::storage::MediaStore;
use crate::utils::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// HTTP server state shared across handlers
///
/// Provider clients are cheap clones over a shared connection pool; the
/// session store is the single shared mutable structure.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub glm: GlmClient,
    pub qwen: QwenClient,
    pub coze: CozeClient,
    pub sessions: Arc<SessionStore>,
    /// Multi-turn chat agent
    pub chat_agent: Arc<ConversationGateway<QwenAgentApp>>,
    /// Multi-turn agent with reasoning traces
    pub deepthink_agent: Arc<ConversationGateway<QwenAgentApp>>,
    pub relay: OmniRelay,
    pub media: MediaStore,
}

impl AppState {
    /// Build all shared resources from the loaded configuration
    pub fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.server.request_timeout_secs);

        let glm = GlmClient::new(&config.providers.glm, timeout)?;
        let qwen = QwenClient::new(&config.providers.qwen, timeout)?;
        let coze = CozeClient::new(&config.providers.coze, timeout)?;

        let sessions = Arc::new(SessionStore::new());
        let chat_agent = Arc::new(ConversationGateway::new(
            QwenAgentApp::new(qwen.clone(), "chat", &config.providers.qwen.chat_app_id),
            Arc::clone(&sessions),
        ));
        let deepthink_agent = Arc::new(ConversationGateway::new(
            QwenAgentApp::new(
                qwen.clone(),
                "deep-think",
                &config.providers.qwen.deepthink_app_id,
            ),
            Arc::clone(&sessions),
        ));
        let relay = OmniRelay::new(Arc::clone(&sessions));
        let media = MediaStore::new(&config.media.root, &config.media.public_base_url);

        Ok(Self {
            config: Arc::new(config),
            glm,
            qwen,
            coze,
            sessions,
            chat_agent,
            deepthink_agent,
            relay,
            media,
        })
    }
}
