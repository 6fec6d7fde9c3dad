use crate::error::AppError;
use crate::models::{MessageView, PageQuery, UserId};
use crate::state::AppState;
use actix_middleware::CallerId;
use actix_web::{get, web, HttpResponse};
use serde::Serialize;

/// Success envelope shared by the chat HTTP endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: &'static str,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: &'static str) -> Self {
        Self {
            success: true,
            data,
            message,
        }
    }
}

#[get("/conversations")]
pub async fn get_conversations(
    state: web::Data<AppState>,
    caller: CallerId,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = query.into_inner().into_page()?;
    let user = UserId::new(caller.0);

    let conversations = state.conversations.recent_conversations(&user, page).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        conversations,
        "Conversations fetched successfully",
    )))
}

#[get("/history/{counterpart_id}")]
pub async fn get_history(
    state: web::Data<AppState>,
    caller: CallerId,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let counterpart = UserId::new(path.into_inner());
    let page = query.into_inner().into_page()?;
    let user = UserId::new(caller.0);

    let messages: Vec<MessageView> = state
        .conversations
        .history(&user, &counterpart, page)
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        messages,
        "Chat history fetched successfully",
    )))
}
