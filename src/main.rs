use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use studyhub::{
    AppState,
    config::{AppConfig, DocumentBackend, Env},
    create_router,
    documents::{DocumentState, MemoryDocumentStore, PgDocumentStore},
    provider::{AuthProviderState, SupabaseAuthProvider},
    recommend::{HttpRecommendationEngine, RecommenderState},
    repository::{PostgresRepository, RepositoryState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects and migrates Postgres, builds every
/// service once and serves until ctrl-c.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "studyhub=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database: pool + embedded migrations
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState;

    // 4. Document store
    let docs: DocumentState = match config.document_backend {
        DocumentBackend::Postgres => Arc::new(PgDocumentStore::new(pool.clone())),
        DocumentBackend::Memory => {
            tracing::warn!("Using the in-memory document store; goals and rankings are lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    // 5. Outbound services
    let auth = Arc::new(SupabaseAuthProvider::new(&config.auth_url, &config.auth_key))
        as AuthProviderState;
    let recommender = Arc::new(HttpRecommendationEngine::new(
        &config.ai_api_url,
        &config.ai_api_key,
        &config.ai_model,
    )) as RecommenderState;

    if !config.admin_override {
        tracing::info!("Admin override disabled: admins only pass admin allow-lists");
    }

    // 6. Unified state and router
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        docs,
        auth,
        recommender,
        config,
    };
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    // 7. Serve until ctrl-c, then release the pool.
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    pool.close().await;
    tracing::info!("Shut down cleanly");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
