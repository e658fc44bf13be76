//! User-facing HTTP API.
//!
//! Users submit data they have already encrypted under their own key; the
//! coordinator re-wraps it under the custodial key before anything reaches a
//! provider, and reverses both steps on retrieval so the user gets back
//! exactly the bytes and envelope descriptor they stored.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{debug, info};

use common::messages::{
    b64_decode, b64_encode, RetrieveUserRequest, RetrieveUserResponse, StoreUserRequest,
    StoreUserResponse,
};
use common::{ContentId, PayloadScope};

use crate::error::CoordinatorError;
use crate::gateway::EncryptionGateway;
use crate::metrics::Metrics;
use crate::placement::PlacementCoordinator;
use crate::state::CoordinatorState;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub placement: Arc<PlacementCoordinator>,
    pub gateway: Arc<EncryptionGateway>,
    pub state: Arc<CoordinatorState>,
    pub metrics: Arc<Metrics>,
}

/// Build the coordinator's HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/user/store", post(store_user))
        .route("/user/retrieve", post(retrieve_user))
        .route("/user/:data_hash", delete(delete_user))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Store user data: re-wrap under the custodial key and place redundantly.
async fn store_user(
    State(app): State<AppState>,
    Json(request): Json<StoreUserRequest>,
) -> Result<Json<StoreUserResponse>, (StatusCode, String)> {
    let data = b64_decode(&request.encrypted_data)
        .map_err(|_| (StatusCode::BAD_REQUEST, "encrypted_data is not valid base64".to_string()))?;
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "empty payload".to_string()));
    }

    // Hash the data as received so semantically different payloads can never
    // collide through nondeterministic re-encryption.
    let content_id = ContentId::identify(&data);
    let envelope = app
        .gateway
        .wrap(&data, &content_id)
        .map_err(error_status)?;

    app.gateway
        .persist_payload(
            PayloadScope::Network,
            &content_id,
            &envelope
                .payload
                .to_json()
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?,
        )
        .map_err(error_status)?;
    app.gateway
        .persist_payload(PayloadScope::User, &content_id, &request.encryption_payload)
        .map_err(error_status)?;

    let record = app
        .placement
        .store(content_id.clone(), envelope.ciphertext)
        .await
        .map_err(error_status)?;

    info!(
        content_id = %content_id,
        providers = record.providers.len(),
        "User data stored"
    );
    Ok(Json(StoreUserResponse {
        data_hash: content_id.as_str().to_string(),
    }))
}

/// Retrieve user data: fetch a verified copy, unwrap the custodial envelope,
/// and return the user's original ciphertext and envelope descriptor.
async fn retrieve_user(
    State(app): State<AppState>,
    Json(request): Json<RetrieveUserRequest>,
) -> Result<Json<RetrieveUserResponse>, (StatusCode, String)> {
    let content_id = ContentId::parse(&request.data_hash)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let ciphertext = app.placement.retrieve(&content_id).await.map_err(error_status)?;

    let payload_json = app
        .gateway
        .load_payload(PayloadScope::Network, &content_id)
        .map_err(error_status)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("no custodial payload for {content_id}"),
            )
        })?;
    let payload = common::envelope::EncryptionPayload::from_json(&payload_json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let data = app
        .gateway
        .unwrap(
            &common::envelope::EncryptionEnvelope {
                ciphertext,
                payload,
            },
            &content_id,
        )
        .map_err(error_status)?;

    let encryption_payload = app
        .gateway
        .load_payload(PayloadScope::User, &content_id)
        .map_err(error_status)?
        .unwrap_or_default();

    debug!(content_id = %content_id, bytes = data.len(), "User data retrieved");
    Ok(Json(RetrieveUserResponse {
        encrypted_data: b64_encode(&data),
        encryption_payload,
    }))
}

/// Delete user data from all providers and drop local state.
async fn delete_user(
    State(app): State<AppState>,
    Path(data_hash): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let content_id =
        ContentId::parse(&data_hash).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    app.placement.delete(&content_id).await.map_err(error_status)?;
    app.gateway.remove_payloads(&content_id).map_err(error_status)?;

    Ok(Json(serde_json::json!({ "deleted": content_id.as_str() })))
}

/// Health check endpoint
async fn status(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "placement_records": app.state.record_count(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics(State(app): State<AppState>) -> String {
    app.metrics.encode()
}

/// Map coordinator errors onto HTTP statuses.
fn error_status(err: CoordinatorError) -> (StatusCode, String) {
    let status = match &err {
        CoordinatorError::UnknownContent(_) | CoordinatorError::DataUnavailable(_) => {
            StatusCode::NOT_FOUND
        }
        CoordinatorError::EmptyPayload => StatusCode::BAD_REQUEST,
        CoordinatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CoordinatorError::QuorumNotMet { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
