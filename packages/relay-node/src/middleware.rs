//! Admission control and request correlation middleware.

use crate::metrics::METRICS;
use crate::state::AppState;
use crate::Error;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// Let a relay request through only while the node can pay for it.
///
/// Readiness alone is not enough: balance and gas price are re-read live,
/// since the background loops may not have noticed a regression yet.
pub async fn assure_relay_ready(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match admit(&state).await {
        Ok(()) => next.run(request).await,
        Err(e) => {
            METRICS.admission_rejected.fetch_add(1, Ordering::Relaxed);
            debug!(reason = %e, "Relay request refused");
            e.into_response()
        }
    }
}

async fn admit(state: &AppState) -> Result<(), Error> {
    if !state.readiness.get() {
        return Err(Error::NotReady("Relay not staked and registered yet".into()));
    }
    // Chain errors stay in the log; callers only learn the relay is not ready.
    match state.engine.balance().await {
        Ok(balance) if !balance.is_zero() => {}
        Ok(_) => return Err(Error::NotReady("Waiting for funding...".into())),
        Err(e) => {
            warn!(error = %e, "Balance check failed during admission");
            return Err(Error::NotReady("Waiting for funding...".into()));
        }
    }
    if state.engine.gas_price().is_zero() {
        return Err(Error::NotReady("Waiting for gasPrice...".into()));
    }
    Ok(())
}

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request id that is kept as is.
const MAX_REQUEST_ID_LEN: usize = 64;

/// Tag each request with an id and run the handler in a span carrying it.
///
/// A client-supplied id is kept only if it is short and made of token
/// characters. Otherwise a fresh one is generated.
pub async fn inject_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| is_acceptable_request_id(id))
        .map(str::to_owned)
        .unwrap_or_else(generate_request_id);

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let span = info_span!("request", req_id = %request_id, path = %request.uri().path());
    let mut response = next.run(request).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    response
}

fn is_acceptable_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

fn generate_request_id() -> String {
    use rand::Rng;
    format!("rel-{:016x}", rand::thread_rng().gen::<u64>())
}

/// Request correlation ID, extractable from `Request::extensions()`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);
