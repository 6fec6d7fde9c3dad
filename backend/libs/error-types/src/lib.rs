use serde::{Deserialize, Serialize};

/// 统一的 API 错误响应格式（所有服务使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误名称，例如 "Bad Request"
    pub error: String,

    /// 错误消息（用户友好的说明）
    pub message: String,

    /// HTTP 状态码
    pub status: u16,

    /// 错误类型，取值见 [`error_types`]
    pub error_type: String,

    /// 错误代码，取值见 [`error_codes`]，例如 "MESSAGE_NOT_FOUND"
    pub code: String,

    /// 时间戳（ISO 8601 格式）
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 标准错误代码
pub mod error_codes {
    // Chat
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const MESSAGE_INVALID: &str = "MESSAGE_INVALID";
    pub const STATUS_TRANSITION_INVALID: &str = "STATUS_TRANSITION_INVALID";
    pub const PAGINATION_INVALID: &str = "PAGINATION_INVALID";

    // Collaborators
    pub const MESSAGE_STORE_UNAVAILABLE: &str = "MESSAGE_STORE_UNAVAILABLE";
    pub const PRESENCE_UNAVAILABLE: &str = "PRESENCE_UNAVAILABLE";

    // Server
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// 错误类型（用于客户端路由处理）
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
