//! Core error kinds / 核心错误类型
//!
//! The core returns tagged results instead of raising from deep call sites;
//! the HTTP layer maps each kind to a status code. / 核心返回带标签的结果，
//! HTTP 层负责映射状态码。

use thiserror::Error;

/// Error kinds the core distinguishes / 核心区分的错误类型
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad request input, raised before any store work / 请求参数错误
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown or expired session token / 会话无效或已过期
    #[error("auth error: {0}")]
    Auth(String),

    /// Referenced entity does not exist / 实体不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// Store failure, aborts the whole request / 数据库错误
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
