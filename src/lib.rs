pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod forms;
pub mod menu;
pub mod models;
pub mod routes;
pub mod schedule;
pub mod uploads;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post, put},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use config::AppConfig;
use db::Store;
use routes::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/events",
            get(routes::list_events).post(routes::create_event),
        )
        .route("/api/events/featured", get(routes::featured_event))
        .route("/api/events/featured/card", get(routes::featured_card))
        .route("/api/events/schedule", get(routes::event_schedule))
        .route(
            "/api/events/{id}",
            get(routes::get_event)
                .put(routes::update_event)
                .delete(routes::delete_event),
        )
        .route("/api/events/{id}/featured", put(routes::set_featured))
        .route(
            "/api/menu-items",
            get(routes::list_menu_items).post(routes::create_menu_item),
        )
        .route("/api/menu", get(routes::menu_sections))
        .route(
            "/api/uploads/event-image",
            post(routes::upload_event_image)
                .layer(DefaultBodyLimit::max(uploads::MAX_IMAGE_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let bind = config.bind.clone();
    // Create the schema up front so a bad database path fails at startup.
    Store::open(&config.database_path)
        .with_context(|| format!("failed to open database {:?}", config.database_path))?;
    info!(database = ?config.database_path, timezone = %config.timezone, "starting server");

    let state = AppState::new(config)?;
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on {bind}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shut down");
    Ok(())
}

/// Replaces the menu table with the bundled house menu.
pub fn seed_menu(config: &AppConfig) -> Result<usize> {
    let items = menu::house_menu()?;
    let mut store = Store::open(&config.database_path)
        .with_context(|| format!("failed to open database {:?}", config.database_path))?;
    let count = store
        .replace_menu(&items)
        .context("failed to replace menu items")?;
    info!(count, "menu seeded");
    Ok(count)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!("failed to install terminate handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
