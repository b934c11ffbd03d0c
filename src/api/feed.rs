//! Feed route / 信息流路由
//!
//! Published objects with `display_in_feed`, visible to the caller, newest
//! feed timestamp first. / 按时间倒序的可见对象流。

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_cookies::Cookies;

use zapiski_backend::auth::{self, UserLevel};
use zapiski_backend::models::Object;

use super::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn feed(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Query(params): Query<FeedQuery>,
) -> ApiResult<Json<Value>> {
    let user = auth::authenticate(&cookies, &state.db).await?;

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let (visibility, binds): (&str, Vec<i64>) = match (user.level, user.user_id) {
        (UserLevel::Admin, _) => ("1 = 1", Vec::new()),
        (UserLevel::User, Some(user_id)) => {
            ("(is_published = 1 OR owner_id = ?)", vec![user_id])
        }
        _ => ("is_published = 1", Vec::new()),
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM objects WHERE display_in_feed = 1 AND {}",
        visibility
    );
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let (total,) = count_query.fetch_one(&state.db).await?;

    let rows_sql = format!(
        "SELECT * FROM objects WHERE display_in_feed = 1 AND {} \
         ORDER BY feed_timestamp IS NULL, feed_timestamp DESC, object_id DESC \
         LIMIT ? OFFSET ?",
        visibility
    );
    let mut rows_query = sqlx::query_as::<_, Object>(&rows_sql);
    for bind in &binds {
        rows_query = rows_query.bind(bind);
    }
    let objects = rows_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    let total_pages = (total as f64 / per_page as f64).ceil() as i64;

    Ok(Json(json!({
        "content": objects,
        "total": total,
        "page": page,
        "per_page": per_page,
        "total_pages": total_pages,
    })))
}
