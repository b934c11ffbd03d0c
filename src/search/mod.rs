//! Search module / 搜索模块
//!
//! Full-text search over the unified `searchables` index (tagged objects
//! and tags mixed in one table). / 标签与对象混合的全文搜索。
//!
//! Write path / 写路径:
//! entity change → extract (flatten for Markdown) → indexer → searchable row
//! Read path / 读路径:
//! query text → parse → auth fragments → engine → ranked (tag | object) rows
//!
//! The store is SQLite, so the store-side full-text constructs live here:
//! the weighted tokenized vector, phrase verification and ranking in
//! `tsvector`, lexeme membership as plain SQL over `searchable_lexemes`.

pub mod engine;
pub mod extract;
pub mod filter;
pub mod flatten;
pub mod indexer;
pub mod query;
pub mod schema;
pub mod tokenizer;
pub mod tsvector;

pub use engine::{SearchEngine, SearchItem, SearchQuery, SearchResult};
pub use indexer::SearchIndexer;
pub use schema::ItemKind;
pub use tokenizer::Analyzer;
