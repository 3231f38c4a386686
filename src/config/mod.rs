//! Configuration management
//!
//! Loads gateway configuration from a YAML file (with env-var fallback) and
//! validates it before the server starts. Configuration is read-only at
//! runtime: provider credentials and defaults are resolved by name at call
//! time from the loaded snapshot.

use crate::utils::error::{GatewayError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Main configuration struct
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    /// Bounded timeout for non-streaming provider calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Per-provider credentials and endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub glm: GlmConfig,
    #[serde(default)]
    pub qwen: QwenConfig,
    #[serde(default)]
    pub coze: CozeConfig,
}

/// Zhipu GLM settings
#[derive(Debug, Clone, Deserialize)]
pub struct GlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_glm_base")]
    pub api_base: String,
}

impl Default for GlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_glm_base(),
        }
    }
}

/// Qwen / DashScope settings
#[derive(Debug, Clone, Deserialize)]
pub struct QwenConfig {
    #[serde(default)]
    pub api_key: String,
    /// Native DashScope API base
    #[serde(default = "default_qwen_base")]
    pub api_base: String,
    /// OpenAI-compatible-mode base, used by vision/OCR/omni calls
    #[serde(default = "default_qwen_compat_base")]
    pub compat_base: String,
    /// Agent application id for multi-turn chat
    #[serde(default)]
    pub chat_app_id: String,
    /// Agent application id for deep-think multi-turn chat
    #[serde(default)]
    pub deepthink_app_id: String,
    /// Default omni voice
    #[serde(default = "default_voice")]
    pub default_voice: String,
}

impl Default for QwenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_qwen_base(),
            compat_base: default_qwen_compat_base(),
            chat_app_id: String::new(),
            deepthink_app_id: String::new(),
            default_voice: default_voice(),
        }
    }
}

/// Coze settings
#[derive(Debug, Clone, Deserialize)]
pub struct CozeConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub bot_id: String,
    #[serde(default = "default_coze_base")]
    pub api_base: String,
}

impl Default for CozeConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            bot_id: String::new(),
            api_base: default_coze_base(),
        }
    }
}

/// Media library settings
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Root directory for stored uploads
    #[serde(default = "default_media_root")]
    pub root: String,
    /// Public URL prefix under which stored files are addressed
    #[serde(default = "default_media_base_url")]
    pub public_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
            public_base_url: default_media_base_url(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_glm_base() -> String {
    "https://open.bigmodel.cn/api/paas/v4".to_string()
}

fn default_qwen_base() -> String {
    "https://dashscope.aliyuncs.com/api/v1".to_string()
}

fn default_qwen_compat_base() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_coze_base() -> String {
    "https://api.coze.cn".to_string()
}

fn default_voice() -> String {
    "Cherry".to_string()
}

fn default_media_root() -> String {
    "media".to_string()
}

fn default_media_base_url() -> String {
    "/media".to_string()
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let mut config = Config::default();

        if let Ok(host) = std::env::var("OMNIGATE_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("OMNIGATE_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| GatewayError::config("OMNIGATE_PORT must be a port number"))?;
        }
        if let Ok(key) = std::env::var("GLM_API_KEY") {
            config.providers.glm.api_key = key;
        }
        if let Ok(key) = std::env::var("QWEN_API_KEY") {
            config.providers.qwen.api_key = key;
        }
        if let Ok(id) = std::env::var("QWEN_APP_ID") {
            config.providers.qwen.chat_app_id = id;
        }
        if let Ok(id) = std::env::var("QWEN_DEEPTHINK_APP_ID") {
            config.providers.qwen.deepthink_app_id = id;
        }
        if let Ok(voice) = std::env::var("QWEN_DEFAULT_VOICE") {
            config.providers.qwen.default_voice = voice;
        }
        if let Ok(token) = std::env::var("COZE_API_TOKEN") {
            config.providers.coze.api_token = token;
        }
        if let Ok(bot) = std::env::var("COZE_BOT_ID") {
            config.providers.coze.bot_id = bot;
        }
        if let Ok(root) = std::env::var("OMNIGATE_MEDIA_ROOT") {
            config.media.root = root;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Missing API keys are warnings, not errors: endpoints backed by an
    /// unconfigured provider report the missing credentials at call time.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(GatewayError::config("server.port must not be 0"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(GatewayError::config(
                "server.request_timeout_secs must not be 0",
            ));
        }

        if self.providers.glm.api_key.is_empty() {
            warn!("GLM API key is not configured; GLM endpoints will fail");
        }
        if self.providers.qwen.api_key.is_empty() {
            warn!("Qwen API key is not configured; Qwen endpoints will fail");
        }
        if self.providers.coze.api_token.is_empty() {
            warn!("Coze API token is not configured; Coze endpoints will fail");
        }

        Ok(())
    }
}
