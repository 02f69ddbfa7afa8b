//! The read-only HTTP query surface (spec §6). An external collaborator in
//! spec terms, but the ambient HTTP framing stack is carried anyway — see
//! the expanded spec's rationale for carrying ambient concerns regardless
//! of feature-scoped non-goals.

mod handlers;
mod routes;

pub use routes::create_app;

use crate::indexers::{AgentBalanceIndexer, AgentIndexer, AgentUsageIndexer, TokenIndexer};
use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Everything a request handler needs: shared references to the four
/// projections plus the page size used to size every paginated response.
#[derive(Clone)]
pub struct ApiState {
    pub agents: Arc<AgentIndexer>,
    pub usage: Arc<AgentUsageIndexer>,
    pub balances: Arc<AgentBalanceIndexer>,
    pub tokens: Arc<TokenIndexer>,
    pub page_size: usize,
}

pub async fn start_server(state: ApiState, bind_addr: &str, enable_cors: bool) -> Result<tokio::task::JoinHandle<()>> {
    let app = create_app(state, enable_cors);
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "query API listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(handle)
}
