//! HTTP request handlers.

use crate::metrics::METRICS;
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::Error;
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use relay_types::{
    AuditRelaysRequest, GetAddrResponse, RelayTransactionRequest, SetHubRequest,
    SignedRelayTransaction,
};
use serde::de::DeserializeOwned;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// Decode a JSON body. Content type is not checked; clients send bare bodies.
fn decode_json<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, Error> {
    let body = body.map_err(|e| {
        Error::InvalidRequest(format!("could not read request body: {}", e.body_text()))
    })?;
    serde_json::from_slice(&body).map_err(|e| Error::InvalidRequest(format!("invalid json: {e}")))
}

/// Sign and broadcast a relayed transaction. Reached only through admission control.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(req_id)): Extension<RequestId>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SignedRelayTransaction>, Error> {
    let start = std::time::Instant::now();
    METRICS.relay_total.fetch_add(1, Ordering::Relaxed);

    let result = async {
        let request: RelayTransactionRequest = decode_json(body)?;
        state.engine.create_relay_transaction(request).await
    }
    .await;
    METRICS.record_relay_duration(start);

    match result {
        Ok(signed) => {
            METRICS.relay_success.fetch_add(1, Ordering::Relaxed);
            info!(req_id = %req_id, tx_hash = %signed.hash, "Relay request served");
            Ok(Json(signed))
        }
        Err(e) => {
            METRICS.relay_error.fetch_add(1, Ordering::Relaxed);
            warn!(req_id = %req_id, error = %e, "Relay request failed");
            Err(e)
        }
    }
}

/// Relay address, advertised minimum gas price and readiness.
pub async fn get_addr(State(state): State<Arc<AppState>>) -> Json<GetAddrResponse> {
    Json(GetAddrResponse {
        relay_server_address: state.engine.address(),
        min_gas_price: state.engine.gas_price(),
        ready: state.readiness.get(),
    })
}

/// Switch hub and restart the background loops. Answers once the loops are
/// restarted, not once the relay is ready again. A client that hangs up early
/// does not interrupt the switch.
pub async fn set_relay_hub(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<&'static str>, Error> {
    let request: SetHubRequest = decode_json(body)?;
    info!(hub = %request.relay_hub_address, "Hub reconfiguration requested");

    state.loops.reconfigure_hub(request.relay_hub_address).await;
    Ok(Json("OK"))
}

/// Check a transaction signed by some relay for a reused nonce.
pub async fn audit(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<&'static str>, Error> {
    let request: AuditRelaysRequest = decode_json(body)?;

    let raw = alloy::primitives::hex::decode(request.signed_tx.trim())
        .map_err(|e| Error::InvalidRequest(format!("signed tx is not hex: {e}")))?;
    let tx = TxEnvelope::decode_2718(&mut raw.as_slice())
        .map_err(|e| Error::InvalidRequest(format!("could not decode signed tx: {e}")))?;

    state.engine.audit_relay_transaction(tx).await?;
    Ok(Json("OK"))
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        METRICS.render(state.readiness.get()),
    )
}
