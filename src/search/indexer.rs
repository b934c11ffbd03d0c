//! Searchable index writer / 搜索索引写入
//!
//! `index_object` / `index_tag` insert-or-replace exactly one row of the
//! `searchables` table together with its lexeme rows, inside one write
//! transaction. Idempotent: unchanged inputs produce a byte-identical row.
//! The index is a derived projection; it never blocks a write to the
//! primary entity. / 幂等写入，索引永不阻塞主实体。

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{CoreError, CoreResult};
use crate::models::{Object, Tag};
use crate::search::extract::{self, TextTiers};
use crate::search::schema::IndexSchema;
use crate::search::tokenizer::Analyzer;
use crate::search::tsvector::TsVector;

#[derive(Clone)]
pub struct SearchIndexer {
    pool: SqlitePool,
    analyzer: Analyzer,
    schema: IndexSchema,
}

impl SearchIndexer {
    pub fn new(pool: SqlitePool, locale: &str) -> CoreResult<Self> {
        Ok(Self {
            pool,
            analyzer: Analyzer::new(locale),
            schema: IndexSchema::new(locale)?,
        })
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// (Re)build the index row of one object / 重建单个对象的索引行
    pub async fn index_object(&self, object_id: i64, modified_at: DateTime<Utc>) -> CoreResult<()> {
        let object: Option<Object> = sqlx::query_as("SELECT * FROM objects WHERE object_id = ?")
            .bind(object_id)
            .fetch_optional(&self.pool)
            .await?;

        let object = object
            .ok_or_else(|| CoreError::NotFound(format!("object {} does not exist", object_id)))?;

        let tiers = extract::object_tiers(&self.pool, &object).await?;
        self.write_row(Some(object_id), None, &tiers, modified_at)
            .await
    }

    /// (Re)build the index row of one tag / 重建单个标签的索引行
    pub async fn index_tag(&self, tag_id: i64, modified_at: DateTime<Utc>) -> CoreResult<()> {
        let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_optional(&self.pool)
            .await?;

        let tag =
            tag.ok_or_else(|| CoreError::NotFound(format!("tag {} does not exist", tag_id)))?;

        let tiers = extract::tag_tiers(&tag);
        self.write_row(None, Some(tag_id), &tiers, modified_at).await
    }

    async fn write_row(
        &self,
        object_id: Option<i64>,
        tag_id: Option<i64>,
        tiers: &TextTiers,
        modified_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let tsv = TsVector::from_tiers(&tiers.a, &tiers.b, &tiers.c, &self.analyzer);
        let tsv_text = tsv.to_text();
        let tsv_column = self.schema.tsv_column();

        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = match (object_id, tag_id) {
            (Some(id), None) => {
                sqlx::query_as("SELECT searchable_id FROM searchables WHERE object_id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            (None, Some(id)) => {
                sqlx::query_as("SELECT searchable_id FROM searchables WHERE tag_id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            _ => {
                return Err(CoreError::Validation(
                    "a searchable row references exactly one entity".to_string(),
                ))
            }
        };

        let searchable_id = match existing {
            Some((searchable_id,)) => {
                sqlx::query(&format!(
                    "UPDATE searchables SET modified_at = ?, text_a = ?, text_b = ?, text_c = ?, \
                     {tsv_column} = ? WHERE searchable_id = ?"
                ))
                .bind(modified_at)
                .bind(&tiers.a)
                .bind(&tiers.b)
                .bind(&tiers.c)
                .bind(&tsv_text)
                .bind(searchable_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM searchable_lexemes WHERE searchable_id = ?")
                    .bind(searchable_id)
                    .execute(&mut *tx)
                    .await?;

                searchable_id
            }
            None => {
                let result = sqlx::query(&format!(
                    "INSERT INTO searchables (object_id, tag_id, modified_at, text_a, text_b, text_c, {tsv_column}) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)"
                ))
                .bind(object_id)
                .bind(tag_id)
                .bind(modified_at)
                .bind(&tiers.a)
                .bind(&tiers.b)
                .bind(&tiers.c)
                .bind(&tsv_text)
                .execute(&mut *tx)
                .await?;

                result.last_insert_rowid()
            }
        };

        for lexeme in tsv.lexemes() {
            sqlx::query("INSERT INTO searchable_lexemes (searchable_id, lexeme) VALUES (?, ?)")
                .bind(searchable_id)
                .bind(lexeme)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Drop the index row of a deleted object; entity deletes normally
    /// cascade, this covers manual maintenance / 删除对象的索引行
    pub async fn remove_object(&self, object_id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM searchables WHERE object_id = ?")
            .bind(object_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop the index row of a deleted tag / 删除标签的索引行
    pub async fn remove_tag(&self, tag_id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM searchables WHERE tag_id = ?")
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rebuild every index row; per-entity failures are logged and skipped
    /// / 全量重建，单实体失败跳过
    pub async fn reindex_all(&self, modified_at: DateTime<Utc>) -> CoreResult<u64> {
        let mut indexed = 0u64;

        let object_ids: Vec<(i64,)> = sqlx::query_as("SELECT object_id FROM objects")
            .fetch_all(&self.pool)
            .await?;
        for (object_id,) in object_ids {
            match self.index_object(object_id, modified_at).await {
                Ok(()) => indexed += 1,
                Err(e) => tracing::warn!("Reindex of object {} failed: {}", object_id, e),
            }
        }

        let tag_ids: Vec<(i64,)> = sqlx::query_as("SELECT tag_id FROM tags")
            .fetch_all(&self.pool)
            .await?;
        for (tag_id,) in tag_ids {
            match self.index_tag(tag_id, modified_at).await {
                Ok(()) => indexed += 1,
                Err(e) => tracing::warn!("Reindex of tag {} failed: {}", tag_id, e),
            }
        }

        tracing::info!("Reindexed {} entities", indexed);
        Ok(indexed)
    }
}
