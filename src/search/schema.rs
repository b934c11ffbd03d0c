//! Typed schema description of the search index / 搜索索引的类型化模式
//!
//! The filter builder and the query engine compose SQL from these
//! descriptors instead of stringly-typed column lookups. / 过滤器与查询
//! 引擎通过类型化列名拼接 SQL。

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Table names the search core touches / 搜索核心涉及的表名
pub mod table {
    pub const OBJECTS: &str = "objects";
    pub const TAGS: &str = "tags";
    pub const SEARCHABLES: &str = "searchables";
    pub const SEARCHABLE_LEXEMES: &str = "searchable_lexemes";
}

/// Columns of `objects` the filter builder needs / objects 表列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectsColumn {
    ObjectId,
    OwnerId,
    IsPublished,
}

impl ObjectsColumn {
    pub const fn name(self) -> &'static str {
        match self {
            ObjectsColumn::ObjectId => "object_id",
            ObjectsColumn::OwnerId => "owner_id",
            ObjectsColumn::IsPublished => "is_published",
        }
    }
}

/// Columns of `tags` the filter builder needs / tags 表列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagsColumn {
    TagId,
    IsPublished,
}

impl TagsColumn {
    pub const fn name(self) -> &'static str {
        match self {
            TagsColumn::TagId => "tag_id",
            TagsColumn::IsPublished => "is_published",
        }
    }
}

/// Fixed columns of `searchables` / searchables 表的固定列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchablesColumn {
    SearchableId,
    ObjectId,
    TagId,
    ModifiedAt,
    TextA,
    TextB,
    TextC,
}

impl SearchablesColumn {
    pub const fn name(self) -> &'static str {
        match self {
            SearchablesColumn::SearchableId => "searchable_id",
            SearchablesColumn::ObjectId => "object_id",
            SearchablesColumn::TagId => "tag_id",
            SearchablesColumn::ModifiedAt => "modified_at",
            SearchablesColumn::TextA => "text_a",
            SearchablesColumn::TextB => "text_b",
            SearchablesColumn::TextC => "text_c",
        }
    }
}

/// Kind of an indexed item / 索引项的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Object,
    Tag,
}

impl ItemKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ItemKind::Object => "object",
            ItemKind::Tag => "tag",
        }
    }
}

/// Locale-dependent part of the index schema: the derived vector column is
/// named `searchable_tsv_<locale>` / 派生向量列名由语言决定
#[derive(Debug, Clone)]
pub struct IndexSchema {
    locale: String,
}

impl IndexSchema {
    pub fn new(locale: &str) -> CoreResult<Self> {
        if locale.is_empty() || !locale.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return Err(CoreError::Validation(format!(
                "invalid search locale identifier: {:?}",
                locale
            )));
        }
        Ok(Self {
            locale: locale.to_string(),
        })
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Name of the derived weighted vector column / 派生加权向量列名
    pub fn tsv_column(&self) -> String {
        format!("searchable_tsv_{}", self.locale)
    }
}
