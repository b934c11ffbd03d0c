//! Search routes / 搜索路由
//!
//! `POST /search` is the core route: body shape errors are 400, a bad
//! session token is 401, zero matches is a 200 with an empty page.
//! `POST /admin/search/reindex` rebuilds the whole index. / 管理端全量重建。

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::Cookies;

use zapiski_backend::auth;
use zapiski_backend::search::{SearchQuery, SearchResult};

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResult>> {
    // Malformed bodies are 400, not axum's default 422 / 格式错误返回400
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.to_string()))?;

    // Shape check before any store work / 先校验，后查库
    state.engine.validate(&request.query)?;

    let user = auth::authenticate(&cookies, &state.db).await?;
    let result = state.engine.search(&request.query, &user).await?;
    Ok(Json(result))
}

pub async fn reindex(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;
    if !user.is_admin() {
        return Err(ApiError::forbidden("admin privileges required"));
    }

    let indexed = state.indexer.reindex_all(Utc::now()).await?;
    Ok(Json(json!({ "code": 200, "indexed": indexed })))
}
