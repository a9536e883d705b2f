pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::ApiState;

use std::net::SocketAddr;

use tracing::info;

use crate::error::{Result, TipsterError};

/// Serve the admin/read API until the process is stopped.
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| TipsterError::Internal(format!("API server error: {e}")))
}
