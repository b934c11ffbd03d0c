//! Database pool and schema migrations / 数据库连接池与迁移
//!
//! All tables are created with `CREATE TABLE IF NOT EXISTS`; the searchable
//! index tables are derived projections and can always be rebuilt from the
//! entity tables. Foreign keys are enforced on every pooled connection so
//! entity deletion cascades into the index. / 外键级联删除索引行。

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::search::schema::IndexSchema;

/// Generate random password / 生成随机密码
fn generate_random_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Open a connection pool with foreign keys enabled / 打开连接池并启用外键
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    // WAL mode only applies to file databases / WAL 仅用于文件数据库
    if !database_url.contains(":memory:") {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Run database migrations / 运行数据库迁移
///
/// `locale` names the stemming locale and therefore the derived vector
/// column `searchable_tsv_<locale>`. / locale 决定派生向量列名。
pub async fn run_migrations(pool: &SqlitePool, locale: &str) -> Result<()> {
    let schema = IndexSchema::new(locale)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            object_id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_type TEXT NOT NULL,
            object_name TEXT NOT NULL,
            object_description TEXT NOT NULL DEFAULT '',
            owner_id INTEGER NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            display_in_feed INTEGER NOT NULL DEFAULT 0,
            feed_timestamp TEXT,
            show_description INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(user_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
            tag_name TEXT NOT NULL,
            tag_description TEXT NOT NULL DEFAULT '',
            is_published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects_tags (
            tag_id INTEGER NOT NULL,
            object_id INTEGER NOT NULL,
            PRIMARY KEY (tag_id, object_id),
            FOREIGN KEY (tag_id) REFERENCES tags(tag_id) ON DELETE CASCADE,
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS links (
            object_id INTEGER PRIMARY KEY,
            link TEXT NOT NULL,
            show_description_as_link INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS markdown (
            object_id INTEGER PRIMARY KEY,
            raw_text TEXT NOT NULL,
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS to_do_lists (
            object_id INTEGER PRIMARY KEY,
            sort_type TEXT NOT NULL DEFAULT 'default',
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS to_do_list_items (
            object_id INTEGER NOT NULL,
            item_number INTEGER NOT NULL,
            item_state TEXT NOT NULL DEFAULT 'active',
            item_text TEXT NOT NULL DEFAULT '',
            commentary TEXT NOT NULL DEFAULT '',
            indent INTEGER NOT NULL DEFAULT 0,
            is_expanded INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (object_id, item_number),
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS composite_properties (
            object_id INTEGER PRIMARY KEY,
            display_mode TEXT NOT NULL DEFAULT 'basic',
            numerate_chapters INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS composite (
            object_id INTEGER NOT NULL,
            subobject_id INTEGER NOT NULL,
            row INTEGER NOT NULL,
            "column" INTEGER NOT NULL,
            selected_tab INTEGER NOT NULL DEFAULT 0,
            is_expanded INTEGER NOT NULL DEFAULT 1,
            show_description_composite INTEGER NOT NULL DEFAULT 1,
            show_description_as_link_composite INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (object_id, subobject_id),
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE,
            FOREIGN KEY (subobject_id) REFERENCES objects(object_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Searchable index rows: exactly one of object_id / tag_id is set
    // / 索引行：object_id 与 tag_id 恰有一个非空
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS searchables (
            searchable_id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_id INTEGER UNIQUE,
            tag_id INTEGER UNIQUE,
            modified_at TEXT NOT NULL,
            text_a TEXT NOT NULL DEFAULT '',
            text_b TEXT NOT NULL DEFAULT '',
            text_c TEXT NOT NULL DEFAULT '',
            {tsv} TEXT NOT NULL DEFAULT '',
            CHECK ((object_id IS NULL) != (tag_id IS NULL)),
            FOREIGN KEY (object_id) REFERENCES objects(object_id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(tag_id) ON DELETE CASCADE
        )
        "#,
        tsv = schema.tsv_column(),
    ))
    .execute(pool)
    .await?;

    // Inverted lexeme index: membership subqueries stay plain SQL and
    // compose with the authorization fragments / 倒排词素表
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS searchable_lexemes (
            searchable_id INTEGER NOT NULL,
            lexeme TEXT NOT NULL,
            PRIMARY KEY (searchable_id, lexeme),
            FOREIGN KEY (searchable_id) REFERENCES searchables(searchable_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_lexemes_lexeme ON searchable_lexemes(lexeme)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_feed ON objects(display_in_feed, feed_timestamp)")
        .execute(pool)
        .await?;

    normalize_naive_timestamps(pool).await?;

    Ok(())
}

/// Rewrite offset-less stored timestamps as UTC / 无时区时间戳按UTC改写
///
/// Earlier deployments stored naive local strings; every timestamp column
/// now carries an explicit offset.
async fn normalize_naive_timestamps(pool: &SqlitePool) -> Result<()> {
    const COLUMNS: &[(&str, &str)] = &[
        ("users", "created_at"),
        ("users", "modified_at"),
        ("objects", "created_at"),
        ("objects", "modified_at"),
        ("objects", "feed_timestamp"),
        ("tags", "created_at"),
        ("tags", "modified_at"),
        ("searchables", "modified_at"),
    ];

    for (table, column) in COLUMNS {
        let sql = format!(
            "UPDATE {table} SET {column} = {column} || '+00:00' \
             WHERE {column} IS NOT NULL \
               AND substr({column}, -1) NOT IN ('Z', 'z') \
               AND substr({column}, -6, 1) NOT IN ('+', '-')",
        );
        let result = sqlx::query(&sql).execute(pool).await?;
        if result.rows_affected() > 0 {
            tracing::info!(
                "Normalized {} naive timestamps in {}.{}",
                result.rows_affected(),
                table,
                column
            );
        }
    }

    Ok(())
}

/// Create the default admin account on an empty user table / 创建默认管理员
pub async fn ensure_admin_user(pool: &SqlitePool) -> Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count == 0 {
        let password = generate_random_password(12);
        let hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (username, password_hash, is_admin, enabled, created_at, modified_at) \
             VALUES ('admin', ?, 1, 1, ?, ?)",
        )
        .bind(&hash)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        tracing::info!("Created default admin user: admin / {}", password);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool, "russian").await.unwrap();
        run_migrations(&pool, "russian").await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM searchables")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_searchable_xor_constraint() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool, "russian").await.unwrap();

        // Neither side set must be rejected / 两侧均空必须被拒绝
        let result = sqlx::query(
            "INSERT INTO searchables (object_id, tag_id, modified_at) VALUES (NULL, NULL, ?)",
        )
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_naive_timestamps_rewritten_as_utc() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool, "russian").await.unwrap();

        sqlx::query(
            "INSERT INTO tags (tag_name, tag_description, is_published, created_at, modified_at) \
             VALUES ('old', '', 1, '2020-05-01 10:00:00', '2020-05-01 10:00:00+03:00')",
        )
        .execute(&pool)
        .await
        .unwrap();

        normalize_naive_timestamps(&pool).await.unwrap();

        let (created, modified): (String, String) =
            sqlx::query_as("SELECT created_at, modified_at FROM tags WHERE tag_name = 'old'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(created, "2020-05-01 10:00:00+00:00");
        // Values that already carry an offset are untouched / 已带偏移的不变
        assert_eq!(modified, "2020-05-01 10:00:00+03:00");
    }
}
