//! Read-only JSON front-end over the consolidated store

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ui::Icons;

pub mod routes;

/// Server state
pub struct AppState {
    pub database_path: PathBuf,
    /// Default cap for `/visit/graph` and `/visit/chain`
    pub max_graph_nodes: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stats", get(routes::get_stats))
        .route("/users", get(routes::list_users))
        .route("/urls", get(routes::list_urls))
        .route("/url", get(routes::get_url))
        .route("/url/visits", get(routes::url_visits))
        .route("/visit", get(routes::get_visit))
        .route("/visit/chain", get(routes::visit_chain))
        .route("/visit/graph", get(routes::visit_graph))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(port: u16, database_path: PathBuf, max_graph_nodes: usize) -> anyhow::Result<()> {
    if !database_path.exists() {
        anyhow::bail!("no consolidated store at {} (run `historian import` first)", database_path.display());
    }

    let state = Arc::new(AppState {
        database_path,
        max_graph_nodes,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);
    println!("{} Server running at http://{}", Icons::GLOBE, addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
