//! Object CRUD routes / 对象增删改查路由
//!
//! Every create and update re-indexes the object best-effort: an index
//! failure is logged and never blocks the entity write. Deletes rely on
//! the foreign-key cascade to drop the index row. / 索引失败不阻塞写入。

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use tower_cookies::Cookies;

use zapiski_backend::auth::{self, RequestUser};
use zapiski_backend::models::{
    CreateObjectRequest, Object, ObjectPayload, SetObjectTagsRequest, UpdateObjectRequest,
};

use super::{ApiError, ApiResult};
use crate::state::AppState;

fn can_view(user: &RequestUser, object: &Object) -> bool {
    user.is_admin() || object.is_published || user.user_id == Some(object.owner_id)
}

fn can_modify(user: &RequestUser, object: &Object) -> bool {
    user.is_admin() || user.user_id == Some(object.owner_id)
}

async fn fetch_object(state: &AppState, object_id: i64) -> ApiResult<Object> {
    let object: Option<Object> = sqlx::query_as("SELECT * FROM objects WHERE object_id = ?")
        .bind(object_id)
        .fetch_optional(&state.db)
        .await?;
    object.ok_or_else(|| ApiError::not_found("object not found"))
}

pub async fn create_object(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    payload: Result<Json<CreateObjectRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    let owner_id = user
        .user_id
        .ok_or_else(|| ApiError::unauthorized("login required"))?;
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.to_string()))?;

    if req.object_name.is_empty() || req.object_name.chars().count() > 255 {
        return Err(ApiError::bad_request("object_name must be 1-255 characters"));
    }

    let now = Utc::now();
    let mut tx = state.db.begin().await?;

    let result = sqlx::query(
        "INSERT INTO objects (object_type, object_name, object_description, owner_id, \
         is_published, display_in_feed, feed_timestamp, show_description, created_at, modified_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(req.payload.object_type())
    .bind(&req.object_name)
    .bind(&req.object_description)
    .bind(owner_id)
    .bind(req.is_published)
    .bind(req.display_in_feed)
    .bind(req.feed_timestamp)
    .bind(req.show_description)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let object_id = result.last_insert_rowid();
    insert_payload(&mut tx, object_id, &req.payload).await?;
    tx.commit().await?;

    if let Err(e) = state.indexer.index_object(object_id, now).await {
        tracing::warn!("Indexing object {} failed: {}", object_id, e);
    }

    Ok(Json(json!({ "code": 200, "object_id": object_id })))
}

pub async fn get_object(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(object_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    let object = fetch_object(&state, object_id).await?;

    // Invisible objects are indistinguishable from missing ones
    // / 不可见与不存在不可区分
    if !can_view(&user, &object) {
        return Err(ApiError::not_found("object not found"));
    }

    let payload = load_payload(&state, &object).await?;
    let tag_ids: Vec<(i64,)> =
        sqlx::query_as("SELECT tag_id FROM objects_tags WHERE object_id = ? ORDER BY tag_id")
            .bind(object_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({
        "object": object,
        "payload": payload,
        "tag_ids": tag_ids.into_iter().map(|(id,)| id).collect::<Vec<_>>(),
    })))
}

pub async fn update_object(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(object_id): Path<i64>,
    payload: Result<Json<UpdateObjectRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.to_string()))?;
    let existing = fetch_object(&state, object_id).await?;

    if !can_modify(&user, &existing) {
        return Err(ApiError::forbidden("not the owner of this object"));
    }

    if let Some(name) = &req.object_name {
        if name.is_empty() || name.chars().count() > 255 {
            return Err(ApiError::bad_request("object_name must be 1-255 characters"));
        }
    }
    if let Some(new_payload) = &req.payload {
        if new_payload.object_type() != existing.object_type {
            return Err(ApiError::bad_request(
                "payload does not match the stored object_type",
            ));
        }
    }

    let now = Utc::now();
    let mut tx = state.db.begin().await?;

    sqlx::query(
        "UPDATE objects SET object_name = ?, object_description = ?, is_published = ?, \
         display_in_feed = ?, feed_timestamp = ?, show_description = ?, modified_at = ? \
         WHERE object_id = ?",
    )
    .bind(req.object_name.unwrap_or(existing.object_name))
    .bind(req.object_description.unwrap_or(existing.object_description))
    .bind(req.is_published.unwrap_or(existing.is_published))
    .bind(req.display_in_feed.unwrap_or(existing.display_in_feed))
    .bind(req.feed_timestamp.unwrap_or(existing.feed_timestamp))
    .bind(req.show_description.unwrap_or(existing.show_description))
    .bind(now)
    .bind(object_id)
    .execute(&mut *tx)
    .await?;

    if let Some(new_payload) = &req.payload {
        delete_payload_rows(&mut tx, object_id).await?;
        insert_payload(&mut tx, object_id, new_payload).await?;
    }

    tx.commit().await?;

    if let Err(e) = state.indexer.index_object(object_id, now).await {
        tracing::warn!("Indexing object {} failed: {}", object_id, e);
    }

    Ok(Json(json!({ "code": 200 })))
}

pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(object_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    let existing = fetch_object(&state, object_id).await?;

    if !can_modify(&user, &existing) {
        return Err(ApiError::forbidden("not the owner of this object"));
    }

    // Payload rows, tag links and the index row go with the cascade
    // / 级联删除载荷、标签关联与索引行
    sqlx::query("DELETE FROM objects WHERE object_id = ?")
        .bind(object_id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "code": 200 })))
}

pub async fn set_object_tags(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(object_id): Path<i64>,
    Json(req): Json<SetObjectTagsRequest>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    let existing = fetch_object(&state, object_id).await?;

    if !can_modify(&user, &existing) {
        return Err(ApiError::forbidden("not the owner of this object"));
    }

    let mut tx = state.db.begin().await?;

    for tag_id in &req.tag_ids {
        let known: Option<(i64,)> = sqlx::query_as("SELECT tag_id FROM tags WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(ApiError::not_found(format!("tag {} not found", tag_id)));
        }
    }

    sqlx::query("DELETE FROM objects_tags WHERE object_id = ?")
        .bind(object_id)
        .execute(&mut *tx)
        .await?;

    for tag_id in &req.tag_ids {
        sqlx::query("INSERT OR IGNORE INTO objects_tags (tag_id, object_id) VALUES (?, ?)")
            .bind(tag_id)
            .bind(object_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(Json(json!({ "code": 200 })))
}

async fn insert_payload(
    tx: &mut Transaction<'_, Sqlite>,
    object_id: i64,
    payload: &ObjectPayload,
) -> ApiResult<()> {
    match payload {
        ObjectPayload::Link {
            link,
            show_description_as_link,
        } => {
            sqlx::query(
                "INSERT INTO links (object_id, link, show_description_as_link) VALUES (?, ?, ?)",
            )
            .bind(object_id)
            .bind(link)
            .bind(show_description_as_link)
            .execute(&mut **tx)
            .await?;
        }
        ObjectPayload::Markdown { raw_text } => {
            sqlx::query("INSERT INTO markdown (object_id, raw_text) VALUES (?, ?)")
                .bind(object_id)
                .bind(raw_text)
                .execute(&mut **tx)
                .await?;
        }
        ObjectPayload::ToDoList { sort_type, items } => {
            sqlx::query("INSERT INTO to_do_lists (object_id, sort_type) VALUES (?, ?)")
                .bind(object_id)
                .bind(sort_type)
                .execute(&mut **tx)
                .await?;
            for item in items {
                sqlx::query(
                    "INSERT INTO to_do_list_items (object_id, item_number, item_state, item_text, \
                     commentary, indent, is_expanded) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(object_id)
                .bind(item.item_number)
                .bind(&item.item_state)
                .bind(&item.item_text)
                .bind(&item.commentary)
                .bind(item.indent)
                .bind(item.is_expanded)
                .execute(&mut **tx)
                .await?;
            }
        }
        ObjectPayload::Composite {
            display_mode,
            numerate_chapters,
            cells,
        } => {
            sqlx::query(
                "INSERT INTO composite_properties (object_id, display_mode, numerate_chapters) \
                 VALUES (?, ?, ?)",
            )
            .bind(object_id)
            .bind(display_mode)
            .bind(numerate_chapters)
            .execute(&mut **tx)
            .await?;
            for cell in cells {
                let known: Option<(i64,)> =
                    sqlx::query_as("SELECT object_id FROM objects WHERE object_id = ?")
                        .bind(cell.subobject_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                if known.is_none() {
                    return Err(ApiError::bad_request(format!(
                        "subobject {} does not exist",
                        cell.subobject_id
                    )));
                }
                sqlx::query(
                    "INSERT INTO composite (object_id, subobject_id, row, \"column\", selected_tab, \
                     is_expanded, show_description_composite, show_description_as_link_composite) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(object_id)
                .bind(cell.subobject_id)
                .bind(cell.row)
                .bind(cell.column)
                .bind(cell.selected_tab)
                .bind(cell.is_expanded)
                .bind(cell.show_description_composite)
                .bind(cell.show_description_as_link_composite)
                .execute(&mut **tx)
                .await?;
            }
        }
    }
    Ok(())
}

async fn delete_payload_rows(tx: &mut Transaction<'_, Sqlite>, object_id: i64) -> ApiResult<()> {
    for table in [
        "links",
        "markdown",
        "to_do_list_items",
        "to_do_lists",
        "composite",
        "composite_properties",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE object_id = ?", table))
            .bind(object_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn load_payload(state: &AppState, object: &Object) -> ApiResult<Value> {
    use zapiski_backend::models::{
        CompositeCellRow, CompositePropertiesRow, LinkRow, MarkdownRow, ToDoListItemRow,
        ToDoListRow,
    };
    use zapiski_backend::models::ObjectType;

    let value = match object.object_type {
        ObjectType::Link => {
            let row: Option<LinkRow> = sqlx::query_as("SELECT * FROM links WHERE object_id = ?")
                .bind(object.object_id)
                .fetch_optional(&state.db)
                .await?;
            json!(row)
        }
        ObjectType::Markdown => {
            let row: Option<MarkdownRow> =
                sqlx::query_as("SELECT * FROM markdown WHERE object_id = ?")
                    .bind(object.object_id)
                    .fetch_optional(&state.db)
                    .await?;
            json!(row)
        }
        ObjectType::ToDoList => {
            let list: Option<ToDoListRow> =
                sqlx::query_as("SELECT * FROM to_do_lists WHERE object_id = ?")
                    .bind(object.object_id)
                    .fetch_optional(&state.db)
                    .await?;
            let items: Vec<ToDoListItemRow> = sqlx::query_as(
                "SELECT * FROM to_do_list_items WHERE object_id = ? ORDER BY item_number",
            )
            .bind(object.object_id)
            .fetch_all(&state.db)
            .await?;
            json!({ "list": list, "items": items })
        }
        ObjectType::Composite => {
            let properties: Option<CompositePropertiesRow> =
                sqlx::query_as("SELECT * FROM composite_properties WHERE object_id = ?")
                    .bind(object.object_id)
                    .fetch_optional(&state.db)
                    .await?;
            let cells: Vec<CompositeCellRow> = sqlx::query_as(
                "SELECT * FROM composite WHERE object_id = ? ORDER BY row, \"column\"",
            )
            .bind(object.object_id)
            .fetch_all(&state.db)
            .await?;
            json!({ "properties": properties, "cells": cells })
        }
    };

    Ok(value)
}
