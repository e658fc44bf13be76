//! HTTP request handlers for the provider.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::debug;

use common::messages::{ProviderRequest, ProviderResponse};

use crate::node::ProviderNode;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<ProviderNode>,
}

/// Build the provider's HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rpc", post(rpc))
        .route("/status", get(status))
        .with_state(state)
}

/// Single protocol endpoint: tagged request in, tagged response out.
async fn rpc(
    State(state): State<AppState>,
    Json(request): Json<ProviderRequest>,
) -> Json<ProviderResponse> {
    debug!(request = message_kind(&request), "Received protocol request");
    Json(state.node.handle(request))
}

/// Health check endpoint
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "provider_id": state.node.provider_id().as_str(),
        "blobs": state.node.store().blob_count(),
    }))
}

fn message_kind(request: &ProviderRequest) -> &'static str {
    match request {
        ProviderRequest::Store(_) => "store",
        ProviderRequest::Challenge(_) => "challenge",
        ProviderRequest::Retrieve(_) => "retrieve",
        ProviderRequest::Delete(_) => "delete",
    }
}
