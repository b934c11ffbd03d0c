//! Authentication routes / 认证路由

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};

use zapiski_backend::auth::{self, SESSION_COOKIE_NAME};
use zapiski_backend::models::{LoginRequest, User};

use super::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    let user: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE username = ? AND enabled = 1")
            .bind(&req.username)
            .fetch_optional(&state.db)
            .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("wrong username or password"))?;

    let valid = bcrypt::verify(&req.password, &user.password_hash)
        .map_err(|_| ApiError::unauthorized("wrong username or password"))?;
    if !valid {
        return Err(ApiError::unauthorized("wrong username or password"));
    }

    let token = auth::create_session(user.user_id, &state.db).await?;

    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.add(cookie);

    Ok(Json(json!({
        "code": 200,
        "user": {
            "user_id": user.user_id,
            "username": user.username,
            "is_admin": user.is_admin,
        }
    })))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<Json<Value>> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE_NAME) {
        auth::delete_session(cookie.value(), &state.db).await?;
        let mut removal = Cookie::new(SESSION_COOKIE_NAME, "");
        removal.set_path("/");
        cookies.remove(removal);
    }
    Ok(Json(json!({ "code": 200 })))
}

pub async fn me(State(state): State<Arc<AppState>>, cookies: Cookies) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;

    match user.user_id {
        Some(user_id) => {
            let row: Option<(String, bool)> =
                sqlx::query_as("SELECT username, is_admin FROM users WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&state.db)
                    .await?;
            match row {
                Some((username, is_admin)) => Ok(Json(json!({
                    "user": { "user_id": user_id, "username": username, "is_admin": is_admin }
                }))),
                None => Ok(Json(json!({ "user": null }))),
            }
        }
        None => Ok(Json(json!({ "user": null }))),
    }
}
