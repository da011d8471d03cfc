use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger::wire::{self, Operation};
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::service_exec::with_service_blocking;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc/:op", post(rpc))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(st): State<SharedState>) -> Json<serde_json::Value> {
    let service = st.service.clone();
    let databases = with_service_blocking(service, |svc| svc.databases().unwrap_or_default())
        .await
        .unwrap_or_default();
    let public_key = st
        .service
        .verifying_key()
        .map(|key| hex::encode(key.as_bytes()));

    Json(serde_json::json!({
        "status": "ok",
        "databases": databases,
        "root_public_key": public_key,
    }))
}

/// `POST /rpc/{operation}`: bincode request in, bincode response out.
/// Failures carry the wire status as HTTP status and the message as text.
async fn rpc(
    State(st): State<SharedState>,
    Path(op): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(operation) = op.parse::<Operation>() else {
        return (StatusCode::NOT_FOUND, format!("unknown operation {op}")).into_response();
    };
    let credential = bearer(&headers);

    let res = with_service_blocking(st.service.clone(), move |svc| {
        svc.handle(operation, &body, credential.as_deref())
    })
    .await;

    match res {
        Ok(Ok(bytes)) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Ok(Err(e)) => {
            debug!(op=%operation, code=%e.code, message=%e.message, "rpc: call rejected");
            let status = StatusCode::from_u16(e.code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, e.message).into_response()
        }
        Err(e) => {
            error!(op=%operation, error=%e, "rpc: service task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                wire::StatusCode::Internal.to_string(),
            )
                .into_response()
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
