use axum::{routing::get, Router};
use bullpen::config::Config;
use bullpen::websocket::{self, SessionRegistry};
use bullpen::{api, engine, AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bullpen=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting bullpen server on {}:{}", config.host, config.port);

    // Session registry for WebSocket connections
    let registry = SessionRegistry::new();

    // The engine task owns all game state; handlers reach it via the handle
    let engine = engine::spawn(config.clone(), registry.clone());

    let state = AppState {
        config: config.clone(),
        engine,
        registry,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("bullpen listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
