use anyhow::Context;
use runlet_client::{ConnectionsClient, ReconcilerClient};
use runlet_processor::api::{self, AppState};
use runlet_processor::config::Config;
use runlet_processor::db;
use runlet_processor::processor::{Collaborators, Processor};
use runlet_processor::repository::{
    PgConnectionStore, PgExecutionStore, PgLogStore, PgTokenStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlet_processor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Runlet Processor...");

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let http = runlet_client::http_client(config.http_timeout)
        .context("Failed to build HTTP client")?;

    let collaborators = Collaborators {
        executions: Arc::new(PgExecutionStore::new(pool.clone())),
        logs: Arc::new(PgLogStore::new(pool.clone(), config.log_buffer_capacity)),
        connections: Arc::new(PgConnectionStore::new(pool.clone())),
        tokens: Arc::new(PgTokenStore::new(pool)),
        transport: Arc::new(ConnectionsClient::with_client(
            &config.connections_endpoint,
            http.clone(),
        )),
        reconciler: Arc::new(ReconcilerClient::with_client(&config.reconciler_url, http)),
    };

    let processor = Arc::new(Processor::new(collaborators, &config));
    let addr = config.bind_addr.clone();
    let app = api::create_router(AppState {
        processor,
        config: Arc::new(config),
    });

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
