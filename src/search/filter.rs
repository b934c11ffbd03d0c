//! Authorization filter builder / 权限过滤构建器
//!
//! Produces, per request, two predicate fragments over a candidate index
//! row `s` — one for object rows, one for tag rows — which the query
//! engine AND-combines with the text predicate. Both are plain subqueries,
//! so the lexeme index stays usable. / 两个可组合的 SQL 子查询片段。
//!
//! Visibility: admins see all; users see published entities plus their own
//! objects; anonymous callers see published entities only.

use crate::auth::{RequestUser, UserLevel};
use crate::search::schema::{table, ObjectsColumn, SearchablesColumn, TagsColumn};

/// One predicate fragment with its bind values / 带绑定值的谓词片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterFragment {
    pub sql: String,
    pub binds: Vec<i64>,
}

impl FilterFragment {
    fn always_true() -> Self {
        Self {
            sql: "1 = 1".to_string(),
            binds: Vec::new(),
        }
    }
}

/// Fragment deciding whether an object row is visible / 对象行可见性片段
///
/// True when the row is a tag row (`object_id` null) or the referenced
/// object is visible to the caller.
pub fn object_visibility(user: &RequestUser) -> FilterFragment {
    let s_object_id = SearchablesColumn::ObjectId.name();
    let object_id = ObjectsColumn::ObjectId.name();
    let is_published = ObjectsColumn::IsPublished.name();
    let owner_id = ObjectsColumn::OwnerId.name();
    let objects = table::OBJECTS;

    match (user.level, user.user_id) {
        (UserLevel::Admin, _) => FilterFragment::always_true(),
        (UserLevel::User, Some(user_id)) => FilterFragment {
            sql: format!(
                "(s.{s_object_id} IS NULL OR EXISTS (\
                 SELECT 1 FROM {objects} o \
                 WHERE o.{object_id} = s.{s_object_id} \
                 AND (o.{is_published} = 1 OR o.{owner_id} = ?)))"
            ),
            binds: vec![user_id],
        },
        // Anonymous (or a user identity without an id): published only
        // / 匿名仅见已发布对象
        _ => FilterFragment {
            sql: format!(
                "(s.{s_object_id} IS NULL OR EXISTS (\
                 SELECT 1 FROM {objects} o \
                 WHERE o.{object_id} = s.{s_object_id} \
                 AND o.{is_published} = 1))"
            ),
            binds: Vec::new(),
        },
    }
}

/// Fragment deciding whether a tag row is visible / 标签行可见性片段
///
/// Non-admins see published tags only.
pub fn tag_visibility(user: &RequestUser) -> FilterFragment {
    let s_tag_id = SearchablesColumn::TagId.name();
    let tag_id = TagsColumn::TagId.name();
    let is_published = TagsColumn::IsPublished.name();
    let tags = table::TAGS;

    match user.level {
        UserLevel::Admin => FilterFragment::always_true(),
        _ => FilterFragment {
            sql: format!(
                "(s.{s_tag_id} IS NULL OR EXISTS (\
                 SELECT 1 FROM {tags} t \
                 WHERE t.{tag_id} = s.{s_tag_id} \
                 AND t.{is_published} = 1))"
            ),
            binds: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_admin_fragments_pass_everything() {
        assert_eq!(object_visibility(&admin()).sql, "1 = 1");
        assert_eq!(tag_visibility(&admin()).sql, "1 = 1");
        assert!(object_visibility(&admin()).binds.is_empty());
    }

    #[test]
    fn test_user_fragment_binds_owner_id() {
        let fragment = object_visibility(&user(42));
        assert!(fragment.sql.contains("owner_id = ?"));
        assert!(fragment.sql.contains("is_published = 1"));
        assert_eq!(fragment.binds, vec![42]);
    }

    #[test]
    fn test_anonymous_fragment_is_published_only() {
        let fragment = object_visibility(&RequestUser::anonymous());
        assert!(!fragment.sql.contains("owner_id"));
        assert!(fragment.sql.contains("is_published = 1"));
        assert!(fragment.binds.is_empty());
    }

    #[test]
    fn test_tag_fragment_ignores_ownership() {
        let fragment = tag_visibility(&user(42));
        assert!(fragment.sql.contains("tags"));
        assert!(!fragment.sql.contains("owner_id"));
        assert!(fragment.binds.is_empty());
    }

    #[test]
    fn test_fragments_pass_tag_rows_through_object_filter() {
        // A tag row (object_id null) must satisfy the object fragment
        // / 标签行必须通过对象片段
        let fragment = object_visibility(&user(1));
        assert!(fragment.sql.starts_with("(s.object_id IS NULL OR "));
    }
}
