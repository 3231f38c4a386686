//! Conversation gateway
//!
//! Gives callers a stable conversational identity across multiple HTTP
//! requests against a stateless remote agent API. The session id is always
//! passed in explicitly by the transport layer; the gateway itself holds no
//! ambient per-caller state.
//!
//! Per-session state machine:
//!
//! - **Uninitialized**: no provider token stored. The first turn issues one
//!   session-init call; on success the returned token is stored and the
//!   session becomes Active. An init failure leaves the session
//!   Uninitialized with no partial state.
//! - **Active**: each turn is sent with the stored token. Provider errors do
//!   not tear the session down; the caller may retry the same turn.

use crate::core::providers::ProviderError;
use crate::core::session::SessionStore;
use crate::utils::error::GatewayError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Reply from one agent turn
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    /// Reasoning trace, present only when requested and supplied
    pub thoughts: Option<Value>,
}

/// Provider-side agent application the gateway talks to
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Name under which this app's session token is stored
    fn app_name(&self) -> &str;

    /// Whether the backing provider has usable credentials
    fn configured(&self) -> bool;

    /// Open a provider-side session and return its token
    async fn init_session(&self) -> Result<String, ProviderError>;

    /// Submit one content turn against an existing session token
    async fn send_turn(
        &self,
        token: &str,
        content: &str,
        with_thoughts: bool,
    ) -> Result<AgentReply, ProviderError>;
}

/// Session-continuity orchestrator for one agent app
pub struct ConversationGateway<B> {
    backend: B,
    sessions: Arc<SessionStore>,
}

impl<B: AgentBackend> ConversationGateway<B> {
    pub fn new(backend: B, sessions: Arc<SessionStore>) -> Self {
        Self { backend, sessions }
    }

    /// Submit one turn for the given session
    ///
    /// Empty input is rejected before any provider call is made, including
    /// session initialization. Repeated identical turns always produce
    /// independent provider calls; nothing is cached.
    pub async fn submit_turn(
        &self,
        session_id: &str,
        content: &str,
        with_thoughts: bool,
    ) -> Result<AgentReply, GatewayError> {
        if content.trim().is_empty() {
            return Err(GatewayError::EmptyInput);
        }

        if !self.backend.configured() {
            return Err(GatewayError::config("API配置缺失"));
        }

        let app = self.backend.app_name().to_string();
        let token = match self.sessions.agent_token(session_id, &app) {
            Some(token) => token,
            None => {
                debug!(session_id, app = %app, "initializing provider session");
                let token = self.backend.init_session().await.map_err(|e| match e {
                    // A response lacking the expected token field is an init
                    // failure, not a generic protocol error
                    ProviderError::Protocol { message, .. } => {
                        GatewayError::session_init(message)
                    }
                    other => GatewayError::from(other),
                })?;
                self.sessions.set_agent_token(session_id, &app, token.clone());
                info!(session_id, app = %app, "provider session established");
                token
            }
        };

        self.backend
            .send_turn(&token, content, with_thoughts)
            .await
            .map_err(|e| {
                error!(session_id, app = %app, error = %e, "agent turn failed");
                GatewayError::from(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that counts provider calls
    struct CountingBackend {
        inits: AtomicUsize,
        turns: AtomicUsize,
        fail_init: bool,
        fail_turn: bool,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                inits: AtomicUsize::new(0),
                turns: AtomicUsize::new(0),
                fail_init: false,
                fail_turn: false,
            }
        }
    }

    #[async_trait]
    impl AgentBackend for Arc<CountingBackend> {
        fn app_name(&self) -> &str {
            "test-app"
        }

        fn configured(&self) -> bool {
            true
        }

        async fn init_session(&self) -> Result<String, ProviderError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(ProviderError::protocol("test", "missing session_id"));
            }
            Ok("token-1".to_string())
        }

        async fn send_turn(
            &self,
            token: &str,
            content: &str,
            _with_thoughts: bool,
        ) -> Result<AgentReply, ProviderError> {
            assert_eq!(token, "token-1");
            self.turns.fetch_add(1, Ordering::SeqCst);
            if self.fail_turn {
                return Err(ProviderError::upstream(
                    "test",
                    Some("rid".to_string()),
                    "500",
                    "boom",
                ));
            }
            Ok(AgentReply {
                text: format!("echo: {}", content),
                thoughts: None,
            })
        }
    }

    #[tokio::test]
    async fn first_turn_initializes_exactly_once_then_reuses_token() {
        let backend = Arc::new(CountingBackend::new());
        let gateway = ConversationGateway::new(backend.clone(), Arc::new(SessionStore::new()));

        gateway.submit_turn("s1", "hello", false).await.unwrap();
        gateway.submit_turn("s1", "again", false).await.unwrap();
        gateway.submit_turn("s1", "third", false).await.unwrap();

        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert_eq!(backend.turns.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input_never_reaches_the_provider() {
        let backend = Arc::new(CountingBackend::new());
        let gateway = ConversationGateway::new(backend.clone(), Arc::new(SessionStore::new()));

        for content in ["", "   ", "\n\t"] {
            let err = gateway.submit_turn("s1", content, false).await.unwrap_err();
            assert!(matches!(err, GatewayError::EmptyInput));
        }

        assert_eq!(backend.inits.load(Ordering::SeqCst), 0);
        assert_eq!(backend.turns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_init_leaves_session_uninitialized() {
        let backend = Arc::new(CountingBackend {
            fail_init: true,
            ..CountingBackend::new()
        });
        let sessions = Arc::new(SessionStore::new());
        let gateway = ConversationGateway::new(backend.clone(), sessions.clone());

        let err = gateway.submit_turn("s1", "hello", false).await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionInit(_)));
        assert_eq!(sessions.agent_token("s1", "test-app"), None);
    }

    #[tokio::test]
    async fn upstream_turn_error_keeps_session_active() {
        let backend = Arc::new(CountingBackend {
            fail_turn: true,
            ..CountingBackend::new()
        });
        let sessions = Arc::new(SessionStore::new());
        let gateway = ConversationGateway::new(backend.clone(), sessions.clone());

        let err = gateway.submit_turn("s1", "hello", false).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Provider(ProviderError::Upstream { .. })
        ));
        // Token survives the failed turn so the caller can retry
        assert_eq!(
            sessions.agent_token("s1", "test-app").as_deref(),
            Some("token-1")
        );
        // The retry goes straight to the turn call, no re-init
        let _ = gateway.submit_turn("s1", "hello", false).await;
        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert_eq!(backend.turns.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_identical_turns_are_independent_calls() {
        let backend = Arc::new(CountingBackend::new());
        let gateway = ConversationGateway::new(backend.clone(), Arc::new(SessionStore::new()));

        gateway.submit_turn("s1", "same", false).await.unwrap();
        gateway.submit_turn("s1", "same", false).await.unwrap();

        assert_eq!(backend.turns.load(Ordering::SeqCst), 2);
    }
}
