use resync_engine::Database;
use resync_server::{app, config::Config, db, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "resync_server=debug,resync_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Resync Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.max_connections).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Declare tables
    let database = Database::new();
    for schema in &config.tables {
        match db::PgTable::new(pool.clone(), schema.clone()) {
            Ok(table) => {
                tracing::info!("Serving table {} (key {})", schema.name, schema.primary_key);
                database.add_table(Arc::new(table));
            }
            Err(e) => tracing::warn!("Skipping table {}: {}", schema.name, e),
        }
    }
    if database.table_names().is_empty() {
        tracing::warn!("No tables declared, set RESYNC_TABLES");
    }

    let app = app(AppState::new(database));

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
