use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use state::AppState;
use zapiski_backend::search::{SearchEngine, SearchIndexer};
use zapiski_backend::{config, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zapiski_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    let app_config = config::load_config().expect("Failed to load configuration");
    tracing::info!(
        "Server will listen on {}:{}",
        app_config.server.host,
        app_config.server.port
    );

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| app_config.get_database_url());

    let pool = db::connect(&database_url, 8).await?;

    let locale = app_config.search.locale.clone();
    db::run_migrations(&pool, &locale).await?;
    db::ensure_admin_user(&pool).await?;
    tracing::info!("Search locale: {}", locale);

    let state = Arc::new(AppState {
        db: pool.clone(),
        engine: SearchEngine::new(pool.clone(), &locale)?,
        indexer: SearchIndexer::new(pool, &locale)?,
    });

    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        .route("/search", post(api::search::search))
        .route("/admin/search/reindex", post(api::search::reindex))
        .route("/objects", post(api::objects::create_object))
        .route("/objects/:id", get(api::objects::get_object))
        .route("/objects/:id", post(api::objects::update_object))
        .route("/objects/:id/delete", post(api::objects::delete_object))
        .route("/objects/:id/tags", post(api::objects::set_object_tags))
        .route("/tags", get(api::tags::list_tags))
        .route("/tags", post(api::tags::create_tag))
        .route("/tags/:id", get(api::tags::get_tag))
        .route("/tags/:id", post(api::tags::update_tag))
        .route("/tags/:id/delete", post(api::tags::delete_tag))
        .route("/feed", get(api::feed::feed))
        .layer(CookieManagerLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
