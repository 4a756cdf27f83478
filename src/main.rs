use evento::{
    config::{validate_production_config, AppConfig},
    db, routes, services, AppState,
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evento=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    validate_production_config(&config)?;

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    let email_service = services::create_email_service();
    let addr = SocketAddr::from((config.host, config.port));
    let app_state = AppState::new(pool, config, email_service);

    match app_state.token_service.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => tracing::info!("Purged {} expired tokens", purged),
        Err(e) => tracing::warn!("Failed to purge expired tokens: {}", e),
    }

    let app = routes::build_router(app_state);

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
