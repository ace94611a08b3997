//! HTTP错误映射

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use oct_core::OctError;
use serde_json::json;

/// axum响应错误包装
///
/// 核心错误类型定义在oct-core，孤儿规则不允许直接为它实现IntoResponse。
#[derive(Debug)]
pub struct ApiError(pub OctError);

impl From<OctError> for ApiError {
    fn from(e: OctError) -> Self {
        Self(e)
    }
}

/// HTTP处理器统一结果类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            OctError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                json!({"error": true, "field": field, "message": message}),
            ),
            OctError::Conflict { field, message } => (
                StatusCode::CONFLICT,
                json!({"error": true, "field": field, "message": message}),
            ),
            OctError::NotFound(message) => {
                (StatusCode::NOT_FOUND, json!({"error": true, "message": message}))
            }
            OctError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, json!({"error": true, "message": message}))
            }
            OctError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({"error": true, "message": message}))
            }
            // 其余错误细节只进日志，不回给调用方
            other => {
                tracing::error!("Internal error while handling request: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": true, "message": "Internal server error"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_their_status() {
        let cases = [
            (OctError::validation("email", "bad"), StatusCode::BAD_REQUEST),
            (OctError::conflict("username", "taken"), StatusCode::CONFLICT),
            (OctError::NotFound("missing".into()), StatusCode::NOT_FOUND),
            (OctError::Forbidden("denied".into()), StatusCode::FORBIDDEN),
            (OctError::Unauthorized("no token".into()), StatusCode::UNAUTHORIZED),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError(error).into_response().status(), expected);
        }
    }

    #[test]
    fn test_internal_errors_collapse_to_500() {
        let cases = [
            OctError::Database("connection reset".into()),
            OctError::Storage("disk full".into()),
            OctError::Analysis("oracle timeout".into()),
            OctError::Internal("bug".into()),
        ];

        for error in cases {
            assert_eq!(
                ApiError(error).into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }
}
