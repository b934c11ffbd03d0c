use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object variants / 对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ObjectType {
    Link,
    Markdown,
    ToDoList,
    Composite,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Link => "link",
            ObjectType::Markdown => "markdown",
            ObjectType::ToDoList => "to_do_list",
            ObjectType::Composite => "composite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Object {
    pub object_id: i64,
    pub object_type: ObjectType,
    pub object_name: String,
    pub object_description: String,
    pub owner_id: i64,
    pub is_published: bool,
    pub display_in_feed: bool,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub show_description: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub tag_id: i64,
    pub tag_name: String,
    pub tag_description: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LinkRow {
    pub object_id: i64,
    pub link: String,
    pub show_description_as_link: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MarkdownRow {
    pub object_id: i64,
    pub raw_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ToDoListRow {
    pub object_id: i64,
    pub sort_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ToDoListItemRow {
    pub object_id: i64,
    pub item_number: i64,
    pub item_state: String,
    pub item_text: String,
    pub commentary: String,
    pub indent: i64,
    pub is_expanded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompositePropertiesRow {
    pub object_id: i64,
    pub display_mode: String,
    pub numerate_chapters: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompositeCellRow {
    pub object_id: i64,
    pub subobject_id: i64,
    pub column: i64,
    pub selected_tab: i64,
    pub is_expanded: bool,
    pub show_description_composite: bool,
    pub show_description_as_link_composite: bool,
    // `row` must be the last field: the sqlx `FromRow` derive binds a local
    // named `row`, which would shadow the `Row` value for any field declared
    // after it. Keeping it last avoids the shadow without renaming the column.
    pub row: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One row of the searchable index (derived projection, never authoritative)
/// / 搜索索引行（派生投影）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchableRow {
    pub searchable_id: i64,
    pub object_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub modified_at: DateTime<Utc>,
    pub text_a: String,
    pub text_b: String,
    pub text_c: String,
}

// ---- request payloads / 请求结构 ----

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Typed per-variant payload, tagged by object_type / 按对象类型区分的载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "object_type", rename_all = "snake_case")]
pub enum ObjectPayload {
    Link {
        link: String,
        #[serde(default)]
        show_description_as_link: bool,
    },
    Markdown {
        raw_text: String,
    },
    ToDoList {
        #[serde(default = "default_sort_type")]
        sort_type: String,
        #[serde(default)]
        items: Vec<ToDoItemInput>,
    },
    Composite {
        #[serde(default = "default_display_mode")]
        display_mode: String,
        #[serde(default)]
        numerate_chapters: bool,
        #[serde(default)]
        cells: Vec<CompositeCellInput>,
    },
}

impl ObjectPayload {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectPayload::Link { .. } => ObjectType::Link,
            ObjectPayload::Markdown { .. } => ObjectType::Markdown,
            ObjectPayload::ToDoList { .. } => ObjectType::ToDoList,
            ObjectPayload::Composite { .. } => ObjectType::Composite,
        }
    }
}

fn default_sort_type() -> String {
    "default".to_string()
}

fn default_display_mode() -> String {
    "basic".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToDoItemInput {
    pub item_number: i64,
    #[serde(default = "default_item_state")]
    pub item_state: String,
    pub item_text: String,
    #[serde(default)]
    pub commentary: String,
    #[serde(default)]
    pub indent: i64,
    #[serde(default = "default_true")]
    pub is_expanded: bool,
}

fn default_item_state() -> String {
    "active".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeCellInput {
    pub subobject_id: i64,
    pub row: i64,
    pub column: i64,
    #[serde(default)]
    pub selected_tab: i64,
    #[serde(default = "default_true")]
    pub is_expanded: bool,
    #[serde(default = "default_true")]
    pub show_description_composite: bool,
    #[serde(default)]
    pub show_description_as_link_composite: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateObjectRequest {
    pub object_name: String,
    #[serde(default)]
    pub object_description: String,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub display_in_feed: bool,
    #[serde(default)]
    pub feed_timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub show_description: bool,
    #[serde(flatten)]
    pub payload: ObjectPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateObjectRequest {
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub object_description: Option<String>,
    #[serde(default)]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub display_in_feed: Option<bool>,
    #[serde(default)]
    pub feed_timestamp: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub show_description: Option<bool>,
    /// Replacement payload; must match the stored object_type / 替换载荷
    #[serde(default)]
    pub payload: Option<ObjectPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    pub tag_name: String,
    #[serde(default)]
    pub tag_description: String,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTagRequest {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub tag_description: Option<String>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetObjectTagsRequest {
    pub tag_ids: Vec<i64>,
}
