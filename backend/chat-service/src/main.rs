use actix_middleware::{JwtAuthMiddleware, JwtVerifier};
use actix_web::{web, App, HttpServer};
use chat_service::{config::Config, error::AppError, logging, routes, state::AppState};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let state = AppState::from_config(cfg.clone()).await?;
    let verifier = Arc::new(JwtVerifier::hs256(&cfg.jwt_secret));

    tracing::info!(
        port = cfg.port,
        presence = ?cfg.presence_backend,
        persistent = cfg.database_url.is_some(),
        "starting chat-service"
    );

    HttpServer::new(move || {
        let auth = JwtAuthMiddleware::new(verifier.clone());
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|svc| routes::configure(svc, auth))
    })
    .bind(("0.0.0.0", cfg.port))
    .map_err(|e| AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(e.to_string()))
}
