use anyhow::Context;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{Extension, Router};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::auth::AuthDoc;
use crate::config::Config;
use crate::db::queries::category::CategoryDoc;
use crate::db::queries::donation::DonationDoc;
use crate::db::queries::item::ItemDoc;
use crate::db::queries::item_request::ItemRequestDoc;
use crate::db::queries::notification::NotificationDoc;
use crate::db::queries::user::UserDoc;
use crate::db::queries::waitlist::WaitlistDoc;
use crate::middleware::auth::{create_permission_cache, jwt_middleware, rbac_middleware};

mod api;
mod config;
mod db;
mod middleware;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    Config::init();

    std::fs::create_dir_all("logs").context("Failed to create logs directory")?;
    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    let config = Config::get();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .idle_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let permission_cache = create_permission_cache();

    let merged_doc = AuthDoc::openapi()
        .merge_from(DonationDoc::openapi())
        .merge_from(ItemRequestDoc::openapi())
        .merge_from(ItemDoc::openapi())
        .merge_from(WaitlistDoc::openapi())
        .merge_from(CategoryDoc::openapi())
        .merge_from(UserDoc::openapi())
        .merge_from(NotificationDoc::openapi());

    let public_routes = Router::new().merge(api::auth::auth_routes());

    let private_routes = Router::new()
        .merge(api::donation::donation_routes())
        .merge(api::item_request::item_request_routes())
        .merge(api::item::item_routes())
        .merge(api::waitlist::waitlist_routes())
        .merge(api::category::category_routes())
        .merge(api::user::user_routes())
        .merge(api::notification::notification_routes())
        .merge(api::auth::secure_auth_routes())
        .route_layer(from_fn_with_state(pool.clone(), rbac_middleware))
        .route_layer(from_fn(jwt_middleware));

    let app = Router::new()
        .merge(api::health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(Extension(permission_cache.clone()))
        .with_state(pool.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    run_server(app, shutdown_tx, pool, config.server_port).await
}

async fn run_server(
    app: Router,
    shutdown_tx: broadcast::Sender<()>,
    pool: PgPool,
    port: u16,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.subscribe(), pool))
        .await
        .context("Server encountered an error")?;

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal(mut shutdown_rx: broadcast::Receiver<()>, pool: PgPool) {
    tokio::select! {
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
        _ = shutdown_rx.recv() => info!("Received shutdown signal."),
    }
    info!("Closing database pool...");
    pool.close().await;
    info!("Database pool closed. Server shutting down.");
}
