//! Query engine / 查询引擎
//!
//! Read path: validate → parse the query text → AND-combine the lexeme
//! predicates with the caller's visibility fragments → rank the candidate
//! set → paginate. The candidate query runs once inside a read transaction;
//! the ranked page and `total_items` both come from that single snapshot,
//! so they can never disagree under concurrent writes. / 单快照取数。
//!
//! Validation happens before any store work; zero matches is a success
//! with an empty page, never an error.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::auth::RequestUser;
use crate::error::{CoreError, CoreResult};
use crate::search::filter;
use crate::search::query::ParsedQuery;
use crate::search::schema::{table, IndexSchema, ItemKind, SearchablesColumn};
use crate::search::tokenizer::Analyzer;
use crate::search::tsvector::TsVector;

/// Longest accepted query text / 查询文本长度上限
pub const MAX_QUERY_CHARS: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_text: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_items_per_page() -> i64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub item_id: i64,
    pub item_type: ItemKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query_text: String,
    pub page: i64,
    pub items_per_page: i64,
    pub items: Vec<SearchItem>,
    pub total_items: i64,
}

struct Candidate {
    object_id: Option<i64>,
    tag_id: Option<i64>,
    rank: f32,
}

#[derive(Clone)]
pub struct SearchEngine {
    pool: SqlitePool,
    analyzer: Analyzer,
    schema: IndexSchema,
}

impl SearchEngine {
    pub fn new(pool: SqlitePool, locale: &str) -> CoreResult<Self> {
        Ok(Self {
            pool,
            analyzer: Analyzer::new(locale),
            schema: IndexSchema::new(locale)?,
        })
    }

    /// Check the query shape; raised before any store work / 前置校验
    pub fn validate(&self, query: &SearchQuery) -> CoreResult<()> {
        if query.query_text.trim().is_empty() {
            return Err(CoreError::Validation(
                "query text must not be empty".to_string(),
            ));
        }
        if query.query_text.chars().count() > MAX_QUERY_CHARS {
            return Err(CoreError::Validation(format!(
                "query text longer than {} characters",
                MAX_QUERY_CHARS
            )));
        }
        if query.page < 1 {
            return Err(CoreError::Validation("page must be >= 1".to_string()));
        }
        if query.items_per_page < 1 {
            return Err(CoreError::Validation(
                "items_per_page must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Run one search for the resolved caller / 执行一次检索
    pub async fn search(
        &self,
        query: &SearchQuery,
        user: &RequestUser,
    ) -> CoreResult<SearchResult> {
        self.validate(query)?;

        let parsed = ParsedQuery::parse(&query.query_text, &self.analyzer);
        if !parsed.has_positive() {
            // Nothing tokenizable to match: empty success / 无可匹配词素
            return Ok(self.empty_result(query));
        }

        let positive = parsed.positive_lexemes();
        let negated = parsed.negated_lexemes();
        let object_fragment = filter::object_visibility(user);
        let tag_fragment = filter::tag_visibility(user);

        let searchable_id = SearchablesColumn::SearchableId.name();
        let object_id = SearchablesColumn::ObjectId.name();
        let tag_id = SearchablesColumn::TagId.name();

        let mut sql = format!(
            "SELECT s.{object_id}, s.{tag_id}, s.{tsv} AS tsv FROM {searchables} s WHERE 1 = 1",
            tsv = self.schema.tsv_column(),
            searchables = table::SEARCHABLES,
        );

        let membership = format!(
            " AND s.{searchable_id} {{op}} (SELECT {searchable_id} FROM {lexemes} WHERE lexeme = ?)",
            lexemes = table::SEARCHABLE_LEXEMES,
        );
        for _ in &positive {
            sql.push_str(&membership.replace("{op}", "IN"));
        }
        for _ in &negated {
            sql.push_str(&membership.replace("{op}", "NOT IN"));
        }
        sql.push_str(&format!(
            " AND {} AND {}",
            object_fragment.sql, tag_fragment.sql
        ));

        let mut db_query = sqlx::query(&sql);
        for lexeme in &positive {
            db_query = db_query.bind(lexeme);
        }
        for lexeme in &negated {
            db_query = db_query.bind(lexeme);
        }
        for bind in &object_fragment.binds {
            db_query = db_query.bind(bind);
        }
        for bind in &tag_fragment.binds {
            db_query = db_query.bind(bind);
        }

        // One read transaction: page and total share a snapshot / 同一快照
        let mut tx = self.pool.begin().await?;
        let rows = db_query.fetch_all(&mut *tx).await?;
        tx.commit().await?;

        let mut candidates: Vec<Candidate> = Vec::with_capacity(rows.len());
        for row in rows {
            let object_id: Option<i64> = row.get("object_id");
            let tag_id: Option<i64> = row.get("tag_id");
            let tsv_text: String = row.get("tsv");

            let tsv = match TsVector::parse(&tsv_text) {
                Some(tsv) => tsv,
                None => {
                    tracing::warn!(
                        "Malformed searchable vector for object {:?} / tag {:?}",
                        object_id,
                        tag_id
                    );
                    continue;
                }
            };

            if !phrase_groups_match(&parsed, &tsv) {
                continue;
            }

            candidates.push(Candidate {
                object_id,
                tag_id,
                rank: tsv.rank(&positive),
            });
        }

        // Rank descending; ties break deterministically by insertion order
        // (object_id asc, then tag_id asc) so pages are stable / 稳定排序
        candidates.sort_by(|a, b| {
            b.rank
                .total_cmp(&a.rank)
                .then_with(|| {
                    a.object_id
                        .unwrap_or(i64::MAX)
                        .cmp(&b.object_id.unwrap_or(i64::MAX))
                })
                .then_with(|| {
                    a.tag_id
                        .unwrap_or(i64::MAX)
                        .cmp(&b.tag_id.unwrap_or(i64::MAX))
                })
        });

        let total_items = candidates.len() as i64;
        let offset = (query.page - 1).saturating_mul(query.items_per_page) as usize;

        let items: Vec<SearchItem> = candidates
            .into_iter()
            .skip(offset)
            .take(query.items_per_page as usize)
            .map(|c| match (c.tag_id, c.object_id) {
                (Some(tag_id), _) => SearchItem {
                    item_id: tag_id,
                    item_type: ItemKind::Tag,
                },
                (None, Some(object_id)) => SearchItem {
                    item_id: object_id,
                    item_type: ItemKind::Object,
                },
                (None, None) => unreachable!("searchable rows reference exactly one entity"),
            })
            .collect();

        Ok(SearchResult {
            query_text: query.query_text.clone(),
            page: query.page,
            items_per_page: query.items_per_page,
            items,
            total_items,
        })
    }

    fn empty_result(&self, query: &SearchQuery) -> SearchResult {
        SearchResult {
            query_text: query.query_text.clone(),
            page: query.page,
            items_per_page: query.items_per_page,
            items: Vec::new(),
            total_items: 0,
        }
    }
}

/// Phrase adjacency and negated phrases are verified on the vector
/// / 在向量上校验短语
fn phrase_groups_match(parsed: &ParsedQuery, tsv: &TsVector) -> bool {
    for group in &parsed.groups {
        let needs_check = group.phrase || (group.negated && group.lexemes.len() > 1);
        if !needs_check {
            continue;
        }
        let present = tsv.contains_phrase(&group.lexemes);
        if group.negated == present {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserLevel;
    use crate::db;
    use crate::search::indexer::SearchIndexer;
    use chrono::Utc;
    use std::collections::BTreeSet;

    const LOCALE: &str = "russian";

    async fn setup() -> (SqlitePool, SearchIndexer, SearchEngine) {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        db::run_migrations(&pool, LOCALE).await.unwrap();

        let now = Utc::now();
        for username in ["alice", "boris"] {
            sqlx::query(
                "INSERT INTO users (username, password_hash, is_admin, enabled, created_at, modified_at) \
                 VALUES (?, 'x', 0, 1, ?, ?)",
            )
            .bind(username)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }

        let indexer = SearchIndexer::new(pool.clone(), LOCALE).unwrap();
        let engine = SearchEngine::new(pool.clone(), LOCALE).unwrap();
        (pool, indexer, engine)
    }

    fn admin() -> RequestUser {
        RequestUser {
            user_id: Some(1),
            level: UserLevel::Admin,
        }
    }

    fn user(user_id: i64) -> RequestUser {
        RequestUser {
            user_id: Some(user_id),
            level: UserLevel::User,
        }
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            query_text: text.to_string(),
            page: 1,
            items_per_page: 10,
        }
    }

    async fn insert_object(
        pool: &SqlitePool,
        object_type: &str,
        name: &str,
        description: &str,
        owner_id: i64,
        is_published: bool,
    ) -> i64 {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO objects (object_type, object_name, object_description, owner_id, \
             is_published, display_in_feed, show_description, created_at, modified_at) \
             VALUES (?, ?, ?, ?, ?, 0, 1, ?, ?)",
        )
        .bind(object_type)
        .bind(name)
        .bind(description)
        .bind(owner_id)
        .bind(is_published)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
        result.last_insert_rowid()
    }

    async fn insert_link(
        pool: &SqlitePool,
        indexer: &SearchIndexer,
        name: &str,
        description: &str,
        link: &str,
        owner_id: i64,
        is_published: bool,
    ) -> i64 {
        let object_id =
            insert_object(pool, "link", name, description, owner_id, is_published).await;
        sqlx::query(
            "INSERT INTO links (object_id, link, show_description_as_link) VALUES (?, ?, 0)",
        )
        .bind(object_id)
        .bind(link)
        .execute(pool)
        .await
        .unwrap();
        indexer.index_object(object_id, Utc::now()).await.unwrap();
        object_id
    }

    async fn insert_tag(
        pool: &SqlitePool,
        indexer: &SearchIndexer,
        name: &str,
        description: &str,
        is_published: bool,
    ) -> i64 {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tags (tag_name, tag_description, is_published, created_at, modified_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(is_published)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
        let tag_id = result.last_insert_rowid();
        indexer.index_tag(tag_id, Utc::now()).await.unwrap();
        tag_id
    }

    #[tokio::test]
    async fn test_exact_match_single_object() {
        let (pool, indexer, engine) = setup().await;
        let object_id = insert_link(
            &pool,
            &indexer,
            "Google",
            "Google's website",
            "https://google.com",
            1,
            true,
        )
        .await;

        let result = engine.search(&query("Google"), &admin()).await.unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(
            result.items,
            vec![SearchItem {
                item_id: object_id,
                item_type: ItemKind::Object
            }]
        );
    }

    #[tokio::test]
    async fn test_mixed_tag_and_object_with_exact_name_first() {
        let (pool, indexer, engine) = setup().await;
        let object_id = insert_link(
            &pool,
            &indexer,
            "music history",
            "",
            "https://example.com/history",
            1,
            true,
        )
        .await;
        let tag_id = insert_tag(
            &pool,
            &indexer,
            "music",
            "Everything related to music",
            true,
        )
        .await;

        let result = engine.search(&query("music"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 2);
        assert_eq!(result.items.len(), 2);

        // The exact tier-A match ranks first / 精确命中排在前面
        assert_eq!(
            result.items[0],
            SearchItem {
                item_id: tag_id,
                item_type: ItemKind::Tag
            }
        );
        assert_eq!(
            result.items[1],
            SearchItem {
                item_id: object_id,
                item_type: ItemKind::Object
            }
        );
    }

    #[tokio::test]
    async fn test_authorization_hides_unpublished() {
        let (pool, indexer, engine) = setup().await;
        insert_link(
            &pool,
            &indexer,
            "secret",
            "",
            "https://hidden.example",
            2,
            false,
        )
        .await;

        let anonymous = RequestUser::anonymous();
        let result = engine.search(&query("secret"), &anonymous).await.unwrap();
        assert_eq!(result.total_items, 0);
        assert!(result.items.is_empty());

        let result = engine.search(&query("secret"), &admin()).await.unwrap();
        assert_eq!(result.total_items, 1);

        let result = engine.search(&query("secret"), &user(2)).await.unwrap();
        assert_eq!(result.total_items, 1);

        // A different non-admin user still sees nothing / 其他用户不可见
        let result = engine.search(&query("secret"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 0);
    }

    #[tokio::test]
    async fn test_unpublished_tags_hidden_from_non_admins() {
        let (pool, indexer, engine) = setup().await;
        let tag_id = insert_tag(&pool, &indexer, "drafts", "", false).await;

        let result = engine.search(&query("drafts"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 0);

        let result = engine.search(&query("drafts"), &admin()).await.unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].item_id, tag_id);
    }

    #[tokio::test]
    async fn test_markdown_formulas_are_searchable() {
        let (pool, indexer, engine) = setup().await;
        let object_id = insert_object(&pool, "markdown", "Euler note", "", 1, true).await;
        sqlx::query("INSERT INTO markdown (object_id, raw_text) VALUES (?, ?)")
            .bind(object_id)
            .bind("Euler's identity:\n\n$$e^{i\\pi}+1=0$$\n\nEnd.")
            .execute(&pool)
            .await
            .unwrap();
        indexer.index_object(object_id, Utc::now()).await.unwrap();

        let result = engine.search(&query("identity"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 1);

        // The formula body is in the flattened text / 公式体可检索
        let result = engine.search(&query("e^{i\\pi}"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].item_id, object_id);
    }

    #[tokio::test]
    async fn test_pagination_partitions_the_result() {
        let (pool, indexer, engine) = setup().await;
        let mut inserted = BTreeSet::new();
        for i in 0..25 {
            let id = insert_link(
                &pool,
                &indexer,
                &format!("foo item {:02}", i),
                "",
                "https://example.com",
                1,
                true,
            )
            .await;
            inserted.insert(id);
        }

        let mut seen = BTreeSet::new();
        let mut sizes = Vec::new();
        for page in 1..=3 {
            let result = engine
                .search(
                    &SearchQuery {
                        query_text: "foo".to_string(),
                        page,
                        items_per_page: 10,
                    },
                    &user(1),
                )
                .await
                .unwrap();
            assert_eq!(result.total_items, 25);
            assert!(result.items.len() as i64 <= result.items_per_page);
            sizes.push(result.items.len());
            for item in result.items {
                assert_eq!(item.item_type, ItemKind::Object);
                // No item appears twice across pages / 跨页不重复
                assert!(seen.insert(item.item_id));
            }
        }

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(seen, inserted);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_store_work() {
        let (_pool, _indexer, engine) = setup().await;

        for bad in [
            SearchQuery {
                query_text: "".to_string(),
                page: 1,
                items_per_page: 10,
            },
            SearchQuery {
                query_text: "   ".to_string(),
                page: 1,
                items_per_page: 10,
            },
            SearchQuery {
                query_text: "x".repeat(256),
                page: 1,
                items_per_page: 10,
            },
            SearchQuery {
                query_text: "fine".to_string(),
                page: 0,
                items_per_page: 10,
            },
            SearchQuery {
                query_text: "fine".to_string(),
                page: 1,
                items_per_page: 0,
            },
        ] {
            let result = engine.search(&bad, &admin()).await;
            assert!(matches!(result, Err(CoreError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_zero_matches_is_success() {
        let (_pool, _indexer, engine) = setup().await;
        let result = engine.search(&query("nothing"), &admin()).await.unwrap();
        assert_eq!(result.total_items, 0);
        assert!(result.items.is_empty());

        // Queries that tokenize to nothing behave the same / 无词素同样为空
        let result = engine.search(&query("!!!"), &admin()).await.unwrap();
        assert_eq!(result.total_items, 0);
    }

    #[tokio::test]
    async fn test_implicit_and_requires_every_term() {
        let (pool, indexer, engine) = setup().await;
        insert_link(&pool, &indexer, "music history", "", "https://a.example", 1, true).await;
        insert_link(&pool, &indexer, "music theory", "", "https://b.example", 1, true).await;

        let result = engine
            .search(&query("music history"), &user(1))
            .await
            .unwrap();
        assert_eq!(result.total_items, 1);
    }

    #[tokio::test]
    async fn test_quoted_phrase_requires_adjacency() {
        let (pool, indexer, engine) = setup().await;
        insert_link(
            &pool,
            &indexer,
            "history of music",
            "",
            "https://a.example",
            1,
            true,
        )
        .await;
        let adjacent = insert_link(
            &pool,
            &indexer,
            "music history",
            "",
            "https://b.example",
            1,
            true,
        )
        .await;

        let result = engine
            .search(&query("\"music history\""), &user(1))
            .await
            .unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].item_id, adjacent);
    }

    #[tokio::test]
    async fn test_negation_excludes_matches() {
        let (pool, indexer, engine) = setup().await;
        insert_link(&pool, &indexer, "music history", "", "https://a.example", 1, true).await;
        let plain = insert_link(
            &pool,
            &indexer,
            "music theory",
            "",
            "https://b.example",
            1,
            true,
        )
        .await;

        let result = engine
            .search(&query("music -history"), &user(1))
            .await
            .unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].item_id, plain);
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty_with_full_total() {
        let (pool, indexer, engine) = setup().await;
        insert_link(&pool, &indexer, "solo foo", "", "https://a.example", 1, true).await;

        let result = engine
            .search(
                &SearchQuery {
                    query_text: "foo".to_string(),
                    page: 5,
                    items_per_page: 10,
                },
                &user(1),
            )
            .await
            .unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total_items, 1);
    }

    #[tokio::test]
    async fn test_russian_stemming_matches_inflected_forms() {
        let (pool, indexer, engine) = setup().await;
        let object_id = insert_link(
            &pool,
            &indexer,
            "История музыки",
            "Конспект по истории",
            "https://notes.example",
            1,
            true,
        )
        .await;

        // Different case form of the same word / 不同的格
        let result = engine.search(&query("музыка"), &user(1)).await.unwrap();
        assert_eq!(result.total_items, 1);
        assert_eq!(result.items[0].item_id, object_id);
    }
}
