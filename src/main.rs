// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::{error, info, warn};
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::Config;
use crate::services::{AssetStore, ImagePipeline, ImageProcessor, ModelRegistry};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ImagePipeline>,
    models: Arc<ModelRegistry>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let models = Arc::new(ModelRegistry::from_config(&config));
        let store = AssetStore::new(&config.output_dir, &config.caption_dir);
        let pipeline = Arc::new(ImagePipeline::new(
            models.clone(),
            Arc::new(ImageProcessor::new()),
            store,
            config.model_timeout,
        ));

        Self {
            pipeline,
            models,
            config: Arc::new(config),
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Postfit service...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    if config.gemini_api_key.is_none() {
        warn!("No Gemini API key found. Set GEMINI_API_KEY to enable captions and smart crop.");
    }

    let app_state = AppState::new(config);
    if let Err(e) = app_state.pipeline.store().ensure_dirs().await {
        error!("{}", e);
        return Err(std::io::Error::other(e.to_string()));
    }
    if let Err(e) = std::fs::create_dir_all(&app_state.config.static_dir) {
        warn!(
            "Could not create static dir {}: {}",
            app_state.config.static_dir.display(),
            e
        );
    }

    info!(
        "AI models loaded: gemini={}",
        if app_state.models.is_loaded() { "loaded" } else { "not loaded" }
    );

    let bind_addr = app_state.config.bind_addr.clone();
    info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(handlers::cors())
            .wrap(middleware::Logger::default())
            .configure(handlers::routes)
            .service(actix_files::Files::new(
                "/static",
                app_state.config.static_dir.clone(),
            ))
            .default_service(web::to(handlers::serve_frontend))
    })
    .bind(bind_addr)?
    .run()
    .await
}
