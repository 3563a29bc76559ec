use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};

use taskhub::{
    config::Config,
    db::{db::DBClient, marketdb::MarketExt, memory::MemoryStore},
    routes::create_router,
    service::background_jobs,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let db_client: Arc<dyn MarketExt> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .min_connections(5)
                .connect(database_url)
                .await
                .context("failed to connect to the database")?;
            tracing::info!("Connection to the database is successful");

            let client = DBClient::new(pool);
            client.migrate().await.context("failed to run migrations")?;
            Arc::new(client)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let allowed_origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("CORS_ORIGINS contains an invalid origin")?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    let app = create_router(app_state.clone()).layer(cors);

    if let Some(expiry_hours) = config.open_task_expiry_hours {
        let app_state_clone = app_state.clone();
        tokio::spawn(async move {
            background_jobs::start_open_task_expiry_job(app_state_clone, expiry_hours).await;
        });
    }

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;

    tracing::info!("Server is running on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
