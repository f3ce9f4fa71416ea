use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;

#[cfg(test)]
mod tests;

use config::Config;
use routes::{attendance, balance, dashboard, expenses, menu, orders, staff, stream, wages};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/menu",
            get(menu::list).post(menu::create).patch(menu::update),
        )
        .route(
            "/api/orders",
            get(orders::list_today)
                .post(orders::create)
                .patch(orders::patch_status),
        )
        .route("/api/orders/stream", get(stream::subscribe))
        .route("/api/dashboard", get(dashboard::summary))
        .route(
            "/api/expenses",
            get(expenses::list)
                .post(expenses::create)
                .delete(expenses::remove),
        )
        .route(
            "/api/wages",
            get(wages::list).post(wages::create).delete(wages::remove),
        )
        .route(
            "/api/staff",
            get(staff::list).post(staff::create).delete(staff::remove),
        )
        .route(
            "/api/attendance",
            get(attendance::list)
                .post(attendance::upsert)
                .patch(attendance::update)
                .delete(attendance::remove),
        )
        .route(
            "/api/balance",
            get(balance::get_balance).post(balance::upsert),
        )
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .layer(middleware::from_fn(auth::session_gate))
        .with_state(state)
}

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load();

    info!("Opening database at {}", config.db_path);
    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to open database: {err}");
            return;
        }
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .expect("Failed to bind address");
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shutting down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
