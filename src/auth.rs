//! Session authentication / 会话认证
//!
//! A missing cookie means an anonymous caller; a present but unknown or
//! expired token is an auth error (401 at the rim). The search core never
//! produces auth errors itself, it only consumes the resolved identity.
//! / 无 cookie 为匿名；token 无效或过期返回认证错误。

use rand::Rng;
use serde::Serialize;
use sqlx::SqlitePool;
use tower_cookies::Cookies;

use crate::error::{CoreError, CoreResult};

pub const SESSION_COOKIE_NAME: &str = "session_token";

/// Session lifetime (7 days) / 会话有效期（7天）
const SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Caller privilege level / 调用者权限级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLevel {
    Anonymous,
    User,
    Admin,
}

/// Resolved caller identity, threaded through all core calls
/// / 解析后的调用者身份
#[derive(Debug, Clone, Copy)]
pub struct RequestUser {
    pub user_id: Option<i64>,
    pub level: UserLevel,
}

impl RequestUser {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            level: UserLevel::Anonymous,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.level == UserLevel::Admin
    }
}

/// Resolve the caller from the session cookie / 从会话 cookie 解析调用者
pub async fn authenticate(cookies: &Cookies, pool: &SqlitePool) -> CoreResult<RequestUser> {
    let token = match cookies.get(SESSION_COOKIE_NAME) {
        Some(cookie) => cookie.value().to_string(),
        None => return Ok(RequestUser::anonymous()),
    };

    if token.is_empty() {
        return Ok(RequestUser::anonymous());
    }

    let row: Option<(i64, bool, bool)> = sqlx::query_as(
        "SELECT u.user_id, u.is_admin, u.enabled FROM users u \
         JOIN sessions s ON s.user_id = u.user_id \
         WHERE s.token = ? AND s.expires_at > ?",
    )
    .bind(&token)
    .bind(chrono::Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;

    match row {
        Some((user_id, is_admin, enabled)) if enabled => Ok(RequestUser {
            user_id: Some(user_id),
            level: if is_admin {
                UserLevel::Admin
            } else {
                UserLevel::User
            },
        }),
        Some(_) => Err(CoreError::Auth("account is disabled".to_string())),
        None => Err(CoreError::Auth("invalid or expired session".to_string())),
    }
}

/// Create a new session and return its token / 创建会话并返回 token
pub async fn create_session(user_id: i64, pool: &SqlitePool) -> CoreResult<String> {
    let token: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();

    let expires_at = chrono::Utc::now().timestamp() + SESSION_TTL_SECS;

    // One active session per user / 每个用户一个活跃会话
    sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

/// Delete a session (logout) / 删除会话（登出）
pub async fn delete_session(token: &str, pool: &SqlitePool) -> CoreResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;

    async fn pool_with_user() -> (SqlitePool, i64) {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        db::run_migrations(&pool, "russian").await.unwrap();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (username, password_hash, is_admin, enabled, created_at, modified_at) \
             VALUES ('tester', 'x', 0, 1, ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        let (user_id,): (i64,) = sqlx::query_as("SELECT user_id FROM users WHERE username = 'tester'")
            .fetch_one(&pool)
            .await
            .unwrap();
        (pool, user_id)
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let (pool, user_id) = pool_with_user().await;

        let token = create_session(user_id, &pool).await.unwrap();
        assert_eq!(token.len(), 64);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        delete_session(&token, &pool).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_second_login_replaces_session() {
        let (pool, user_id) = pool_with_user().await;

        let first = create_session(user_id, &pool).await.unwrap();
        let second = create_session(user_id, &pool).await.unwrap();
        assert_ne!(first, second);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
