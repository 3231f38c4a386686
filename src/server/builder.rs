//! Server startup with automatic configuration loading

use crate::config::Config;
use crate::server::server::HttpServer;
use crate::utils::error::Result;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

/// Run the server with automatic configuration loading
///
/// Configuration is taken from the file named by `OMNIGATE_CONFIG` (falling
/// back to `config/gateway.yaml`), then from environment variables if no
/// file is readable.
pub async fn run_server() -> Result<()> {
    info!("Starting omnigate");

    let config_path =
        std::env::var("OMNIGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::from_file(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            warn!(
                "Configuration file {} not usable ({}), falling back to environment",
                config_path, e
            );
            Config::from_env()?
        }
    };

    let server = HttpServer::new(&config)?;
    info!(
        "Server starting at http://{}:{}",
        config.server.host, config.server.port
    );
    server.start().await
}
