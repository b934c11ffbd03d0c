//! Tag routes / 标签路由
//!
//! Tags are managed by administrators; non-admins see published tags only.
//! Creates and updates re-index the tag best-effort. / 标签由管理员维护。

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::Cookies;

use zapiski_backend::auth::{self, RequestUser};
use zapiski_backend::models::{CreateTagRequest, Tag, UpdateTagRequest};

use super::{ApiError, ApiResult};
use crate::state::AppState;

async fn require_admin(state: &AppState, cookies: &Cookies) -> ApiResult<RequestUser> {
    let user = auth::authenticate(cookies, &state.db).await?;
    if !user.is_admin() {
        return Err(ApiError::forbidden("admin privileges required"));
    }
    Ok(user)
}

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<CreateTagRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &cookies).await?;

    if req.tag_name.is_empty() || req.tag_name.chars().count() > 255 {
        return Err(ApiError::bad_request("tag_name must be 1-255 characters"));
    }

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO tags (tag_name, tag_description, is_published, created_at, modified_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&req.tag_name)
    .bind(&req.tag_description)
    .bind(req.is_published)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    let tag_id = result.last_insert_rowid();
    if let Err(e) = state.indexer.index_tag(tag_id, now).await {
        tracing::warn!("Indexing tag {} failed: {}", tag_id, e);
    }

    Ok(Json(json!({ "code": 200, "tag_id": tag_id })))
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;

    let tags: Vec<Tag> = if user.is_admin() {
        sqlx::query_as("SELECT * FROM tags ORDER BY tag_name")
            .fetch_all(&state.db)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM tags WHERE is_published = 1 ORDER BY tag_name")
            .fetch_all(&state.db)
            .await?
    };

    Ok(Json(json!({ "content": tags })))
}

pub async fn get_tag(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(tag_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;

    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE tag_id = ?")
        .bind(tag_id)
        .fetch_optional(&state.db)
        .await?;
    let tag = tag.ok_or_else(|| ApiError::not_found("tag not found"))?;

    if !tag.is_published && !user.is_admin() {
        return Err(ApiError::not_found("tag not found"));
    }

    Ok(Json(json!({ "tag": tag })))
}

pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(tag_id): Path<i64>,
    Json(req): Json<UpdateTagRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &cookies).await?;

    let existing: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE tag_id = ?")
        .bind(tag_id)
        .fetch_optional(&state.db)
        .await?;
    let existing = existing.ok_or_else(|| ApiError::not_found("tag not found"))?;

    if let Some(name) = &req.tag_name {
        if name.is_empty() || name.chars().count() > 255 {
            return Err(ApiError::bad_request("tag_name must be 1-255 characters"));
        }
    }

    let now = Utc::now();
    sqlx::query(
        "UPDATE tags SET tag_name = ?, tag_description = ?, is_published = ?, modified_at = ? \
         WHERE tag_id = ?",
    )
    .bind(req.tag_name.unwrap_or(existing.tag_name))
    .bind(req.tag_description.unwrap_or(existing.tag_description))
    .bind(req.is_published.unwrap_or(existing.is_published))
    .bind(now)
    .bind(tag_id)
    .execute(&state.db)
    .await?;

    if let Err(e) = state.indexer.index_tag(tag_id, now).await {
        tracing::warn!("Indexing tag {} failed: {}", tag_id, e);
    }

    Ok(Json(json!({ "code": 200 })))
}

pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(tag_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &cookies).await?;

    // Tag links and the index row go with the cascade / 级联删除
    let result = sqlx::query("DELETE FROM tags WHERE tag_id = ?")
        .bind(tag_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("tag not found"));
    }

    Ok(Json(json!({ "code": 200 })))
}
