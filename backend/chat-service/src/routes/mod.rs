pub mod conversations;
pub mod wsroute;

use crate::error::AppError;
use actix_middleware::JwtAuthMiddleware;
use actix_web::{web, HttpResponse};

/// Mounts the chat API under `/api/v1/chat`, plus `/ws` and `/health`.
pub fn configure(cfg: &mut web::ServiceConfig, auth: JwtAuthMiddleware) {
    // Query strings on these routes only carry paging parameters.
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Pagination(err.to_string()).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into());

    cfg.service(
        web::scope("/api/v1/chat")
            .wrap(auth)
            .app_data(query_config)
            .app_data(path_config)
            .service(conversations::get_conversations)
            .service(conversations::get_history),
    )
    .service(wsroute::ws_handler)
    .route("/health", web::get().to(|| async { HttpResponse::Ok().body("OK") }));
}
