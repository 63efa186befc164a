//! HTTP server

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use crate::DiskService;

/// Build the API router around a shared service
pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.config().max_upload_bytes).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Disks
        .route(
            "/api/virtual-disk",
            get(handlers::list_disks).post(handlers::create_disk),
        )
        .route("/api/virtual-disk/convert/{disk_id}", post(handlers::convert_disk))
        .route("/api/virtual-disk/resize/{disk_id}", post(handlers::resize_disk))
        .route("/api/virtual-disk/info/{disk_id}", get(handlers::disk_info))

        // Machines
        .route(
            "/api/vms",
            post(handlers::start_machine).layer(DefaultBodyLimit::max(upload_limit)),
        )

        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP API Server
pub struct Server {
    service: AppState,
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Create a new server
    pub fn new(service: DiskService, addr: SocketAddr) -> Self {
        let service = Arc::new(service);
        Self {
            router: router(service.clone()),
            service,
            addr,
        }
    }

    /// Run the server until Ctrl-C. Running machines are stopped so
    /// in-flight launch requests can complete.
    pub async fn run(self) -> Result<(), std::io::Error> {
        tracing::info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(self.service))
            .await
    }
}

async fn shutdown_signal(service: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down API server");
    service.shutdown();
}
