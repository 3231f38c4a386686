//! HTTP server core implementation

use crate::config::{Config, ServerConfig};
use crate::server::handlers::health_check;
use crate::server::routes;
use crate::server::state::AppState;
use crate::utils::error::{GatewayError, Result};
use actix_cors::Cors;
use actix_web::{
    middleware::DefaultHeaders, web, App, HttpServer as ActixHttpServer,
};
use tracing::info;
use tracing_actix_web::TracingLogger;

/// HTTP server
pub struct HttpServer {
    config: ServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: &Config) -> Result<Self> {
        info!("Creating HTTP server");
        let state = AppState::new(config.clone())?;
        Ok(Self {
            config: config.server.clone(),
            state,
        })
    }

    /// Create the Actix-web application
    pub fn create_app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let allowed_origins = state.config.server.cors_allowed_origins.clone();
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600);
        if allowed_origins.is_empty() {
            cors = cors.allow_any_origin();
        } else {
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
        }

        App::new()
            .app_data(state)
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(DefaultHeaders::new().add(("Server", "omnigate")))
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/glm/chat", web::post().to(routes::chat::glm_chat))
                    .route("/glm/vision", web::post().to(routes::chat::glm_vision))
                    .route("/glm/images", web::post().to(routes::media::glm_images))
                    .route("/glm/videos", web::post().to(routes::media::glm_videos))
                    .route("/glm/voice", web::post().to(routes::media::glm_voice))
                    .route("/coze/chat", web::post().to(routes::chat::coze_chat))
                    .route("/qwen/chat", web::post().to(routes::chat::qwen_chat))
                    .route("/qwen/vl", web::post().to(routes::chat::qwen_vl))
                    .route("/qwen/ocr", web::post().to(routes::media::qwen_ocr))
                    .route("/qwen/audio", web::post().to(routes::media::qwen_audio))
                    .route(
                        "/qwen/document",
                        web::post().to(routes::media::qwen_document),
                    )
                    .route("/qwen/omni", web::post().to(routes::conversation::omni))
                    .route(
                        "/chat/multi-turn",
                        web::post().to(routes::conversation::multi_turn),
                    )
                    .route(
                        "/chat/deep-think",
                        web::post().to(routes::conversation::deep_think),
                    )
                    .route("/files/upload", web::post().to(routes::upload::upload_file)),
            )
    }

    /// Start the HTTP server
    pub async fn start(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Starting HTTP server on {}", bind_addr);

        let state = web::Data::new(self.state);
        let server = ActixHttpServer::new(move || Self::create_app(state.clone()))
            .bind(&bind_addr)
            .map_err(|e| {
                GatewayError::internal(format!("failed to bind {}: {}", bind_addr, e))
            })?
            .run();

        info!("HTTP server listening on {}", bind_addr);
        server
            .await
            .map_err(|e| GatewayError::internal(format!("server error: {}", e)))?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
