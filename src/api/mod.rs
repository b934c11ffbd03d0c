pub mod auth;
pub mod feed;
pub mod objects;
pub mod search;
pub mod tags;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use zapiski_backend::error::CoreError;

/// HTTP-mapped error / 映射为状态码的错误
///
/// The core yields tagged results; this is where they become status codes:
/// validation 400, auth 401, not found 404, store 500. / 核心结果在此映射。
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Validation(message) => Self::bad_request(message),
            CoreError::Auth(message) => Self::unauthorized(message),
            CoreError::NotFound(message) => Self::not_found(message),
            CoreError::Store(e) => {
                // Store errors abort the request with no partial result
                // / 数据库错误中止整个请求
                tracing::error!("Store error: {}", e);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal server error".to_string(),
                }
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        CoreError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status_codes() {
        let e: ApiError = CoreError::Validation("empty".to_string()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e: ApiError = CoreError::Auth("expired".to_string()).into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);

        let e: ApiError = CoreError::NotFound("gone".to_string()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e: ApiError = CoreError::Store(sqlx::Error::PoolClosed).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        // The store detail is not leaked / 不泄露数据库细节
        assert_eq!(e.message, "internal server error");
    }
}
