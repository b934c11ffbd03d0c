//! Per-variant text extraction / 按对象类型提取文本
//!
//! Each entity yields three plain-text tiers by descending weight:
//!
//! | variant     | tier A       | tier B              | tier C                  |
//! |-------------|--------------|---------------------|-------------------------|
//! | link        | object_name  | object_description  | link URL                |
//! | markdown    | object_name  | object_description  | flattened raw text      |
//! | to_do_list  | object_name  | object_description  | item texts + commentary |
//! | composite   | object_name  | object_description  | (sub-objects index through their own rows) |
//! | tag         | tag_name     | tag_description     | —                       |
//!
//! Extraction never fails the write: a tier that cannot be produced is
//! logged and left empty. / 提取失败只记录日志，写入照常进行。

use sqlx::SqlitePool;

use crate::error::CoreResult;
use crate::models::{Object, ObjectType, Tag};
use crate::search::flatten;

/// The three text tiers of one searchable entity / 三层文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTiers {
    pub a: String,
    pub b: String,
    pub c: String,
}

/// Extract the tiers of an object, loading its payload row / 提取对象文本
pub async fn object_tiers(pool: &SqlitePool, object: &Object) -> CoreResult<TextTiers> {
    let c = match object.object_type {
        ObjectType::Link => {
            let link: Option<(String,)> =
                sqlx::query_as("SELECT link FROM links WHERE object_id = ?")
                    .bind(object.object_id)
                    .fetch_optional(pool)
                    .await?;
            match link {
                Some((link,)) => link,
                None => {
                    tracing::warn!("Object {} has no link row", object.object_id);
                    String::new()
                }
            }
        }
        ObjectType::Markdown => {
            let raw: Option<(String,)> =
                sqlx::query_as("SELECT raw_text FROM markdown WHERE object_id = ?")
                    .bind(object.object_id)
                    .fetch_optional(pool)
                    .await?;
            match raw {
                Some((raw_text,)) => match flatten::flatten(&raw_text) {
                    Ok(flat) => flat,
                    Err(e) => {
                        // Non-fatal: the row is still written with the
                        // tiers that succeeded / 非致命，行照常写入
                        tracing::warn!(
                            "Flattening markdown of object {} failed: {}",
                            object.object_id,
                            e
                        );
                        String::new()
                    }
                },
                None => {
                    tracing::warn!("Object {} has no markdown row", object.object_id);
                    String::new()
                }
            }
        }
        ObjectType::ToDoList => {
            let items: Vec<(String, String)> = sqlx::query_as(
                "SELECT item_text, commentary FROM to_do_list_items \
                 WHERE object_id = ? ORDER BY item_number",
            )
            .bind(object.object_id)
            .fetch_all(pool)
            .await?;

            let mut parts = Vec::with_capacity(items.len() * 2);
            for (item_text, commentary) in items {
                if !item_text.is_empty() {
                    parts.push(item_text);
                }
                if !commentary.is_empty() {
                    parts.push(commentary);
                }
            }
            parts.join(" ")
        }
        // Sub-objects are indexed through their own rows / 子对象各自索引
        ObjectType::Composite => String::new(),
    };

    Ok(TextTiers {
        a: object.object_name.clone(),
        b: object.object_description.clone(),
        c,
    })
}

/// Extract the tiers of a tag / 提取标签文本
pub fn tag_tiers(tag: &Tag) -> TextTiers {
    TextTiers {
        a: tag.tag_name.clone(),
        b: tag.tag_description.clone(),
        c: String::new(),
    }
}
