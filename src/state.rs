use sqlx::SqlitePool;
use zapiski_backend::search::{SearchEngine, SearchIndexer};

/// Shared application state / 应用共享状态
pub struct AppState {
    pub db: SqlitePool,
    pub engine: SearchEngine,
    pub indexer: SearchIndexer,
}
