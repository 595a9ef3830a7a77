use crate::utils::{
    body_json, fast_config, post_json, scripted_state, Calls, ScriptedEngine, HUB_A, HUB_B, RELAY,
};
use alloy::primitives::{Address, Bytes, U256};
use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use relay_node::{create_router, AppState, Config, RelayEngine};
use relay_types::{GetAddrResponse, RelayTransactionRequest, SignedRelayTransaction};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    engine: Arc<ScriptedEngine>,
}

fn app_with(config: Config) -> TestApp {
    let engine = Arc::new(ScriptedEngine::new(HUB_A));
    let state = scripted_state(config, Arc::clone(&engine));
    TestApp {
        router: create_router(Arc::clone(&state)),
        state,
        engine,
    }
}

/// A node that passed bootstrap: ready, funded, gas price known.
async fn ready_app() -> TestApp {
    let app = app_with(fast_config());
    app.engine.refresh_gas_price().await.unwrap();
    app.state.readiness.set(true);
    app
}

fn relay_request(hub: Address) -> RelayTransactionRequest {
    RelayTransactionRequest {
        encoded_function: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
        approval_data: Bytes::new(),
        signature: Bytes::from(vec![0x1b; 65]),
        from: Address::repeat_byte(0x11),
        to: Address::repeat_byte(0x22),
        gas_price: U256::from(30_000_000_000u64),
        gas_limit: U256::from(100_000u64),
        recipient_nonce: U256::ZERO,
        relay_max_nonce: 3,
        relay_fee: U256::from(11u64),
        relay_hub_address: hub,
    }
}

fn error_of(body: &serde_json::Value) -> &str {
    body["error"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_relay_refused_before_bootstrap() -> Result<()> {
    let app = app_with(fast_config());

    let body = serde_json::to_vec(&relay_request(HUB_A))?;
    let response = app.router.oneshot(post_json("/relay", body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(error_of(&body), "Relay not staked and registered yet");
    assert_eq!(Calls::get(&app.engine.calls.create_relay_transaction), 0);
    Ok(())
}

#[tokio::test]
async fn test_relay_refused_while_unfunded() -> Result<()> {
    let app = ready_app().await;
    app.engine.set_balance(U256::ZERO);

    let body = serde_json::to_vec(&relay_request(HUB_A))?;
    let response = app.router.oneshot(post_json("/relay", body)).await?;

    let body = body_json(response).await?;
    assert_eq!(error_of(&body), "Waiting for funding...");
    assert_eq!(Calls::get(&app.engine.calls.create_relay_transaction), 0);
    Ok(())
}

#[tokio::test]
async fn test_relay_refused_without_gas_price() -> Result<()> {
    let app = app_with(fast_config());
    app.state.readiness.set(true);

    let body = serde_json::to_vec(&relay_request(HUB_A))?;
    let response = app.router.oneshot(post_json("/relay", body)).await?;

    let body = body_json(response).await?;
    assert_eq!(error_of(&body), "Waiting for gasPrice...");
    Ok(())
}

#[tokio::test]
async fn test_relay_returns_signed_transaction() -> Result<()> {
    let app = ready_app().await;

    let body = serde_json::to_vec(&relay_request(HUB_A))?;
    let response = app.router.oneshot(post_json("/relay", body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(body.get("error").is_none(), "unexpected error: {body}");
    let signed: SignedRelayTransaction = serde_json::from_value(body)?;
    assert_eq!(signed.to, HUB_A);
    assert_eq!(signed.gas_price, U256::from(30_000_000_000u64));
    assert_eq!(Calls::get(&app.engine.calls.create_relay_transaction), 1);
    Ok(())
}

#[tokio::test]
async fn test_engine_rejection_is_error_envelope() -> Result<()> {
    let app = ready_app().await;

    let body = serde_json::to_vec(&relay_request(HUB_B))?;
    let response = app.router.oneshot(post_json("/relay", body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(error_of(&body).contains("wrong hub address"));
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_answers_promptly() -> Result<()> {
    let app = ready_app().await;

    let request = Request::post("/relay").body(Body::from("not json"))?;
    let response = tokio::time::timeout(Duration::from_secs(2), app.router.oneshot(request)).await??;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(error_of(&body).starts_with("invalid request: invalid json"), "got {body}");
    assert_eq!(Calls::get(&app.engine.calls.create_relay_transaction), 0);
    Ok(())
}

#[tokio::test]
async fn test_getaddr_reports_relay_view() -> Result<()> {
    let app = ready_app().await;

    let response = app
        .router
        .oneshot(Request::get("/getaddr").body(Body::empty())?)
        .await?;
    let addr: GetAddrResponse = serde_json::from_value(body_json(response).await?)?;

    assert_eq!(addr.relay_server_address, RELAY);
    assert_eq!(addr.min_gas_price, app.engine.gas_price());
    assert!(addr.ready);
    Ok(())
}

#[tokio::test]
async fn test_getaddr_is_not_gated() -> Result<()> {
    let app = app_with(fast_config());

    let response = app
        .router
        .oneshot(Request::get("/getaddr").body(Body::empty())?)
        .await?;
    let body = body_json(response).await?;

    assert_eq!(body["Ready"], json!(false));
    assert!(body.get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn test_cors_headers_on_every_response() -> Result<()> {
    let app = app_with(fast_config());

    let requests = vec![
        Request::get("/getaddr").body(Body::empty())?,
        post_json("/relay", "{}"),
        Request::get("/no-such-route").body(Body::empty())?,
    ];
    for request in requests {
        let uri = request.uri().clone();
        let response = app.router.clone().oneshot(request).await?;
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*", "{uri}");
        assert_eq!(headers["access-control-allow-headers"], "*", "{uri}");
        assert!(headers.contains_key("x-request-id"), "{uri}");
    }
    Ok(())
}

#[tokio::test]
async fn test_preflight_is_answered() -> Result<()> {
    let app = app_with(fast_config());

    let request = Request::options("/relay")
        .header("origin", "https://dapp.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .body(Body::empty())?;
    let response = app.router.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    Ok(())
}

#[tokio::test]
async fn test_debug_and_audit_routes_off_by_default() -> Result<()> {
    let app = app_with(fast_config());

    let response = app
        .router
        .clone()
        .oneshot(post_json("/setRelayHub", json!({ "RelayHubAddress": HUB_B }).to_string()))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(post_json("/audit", json!({ "SignedTx": "0x00" }).to_string()))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.engine.hub_address(), HUB_A);
    Ok(())
}

#[tokio::test]
async fn test_set_relay_hub_rejects_bad_address() -> Result<()> {
    let app = app_with(Config {
        debug_api: true,
        ..fast_config()
    });

    let response = app
        .router
        .oneshot(post_json("/setRelayHub", r#"{"RelayHubAddress": "0x1234"}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(error_of(&body).starts_with("invalid request"));
    assert_eq!(app.engine.hub_address(), HUB_A);
    assert!(!app.state.loops.is_running().await);
    Ok(())
}

#[tokio::test]
async fn test_audit_decodes_signed_transaction() -> Result<()> {
    use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
    use alloy::eips::eip2718::Encodable2718;
    use alloy::network::TxSignerSync;
    use alloy::primitives::TxKind;
    use alloy::signers::local::PrivateKeySigner;

    let app = app_with(Config {
        audit_api: true,
        ..fast_config()
    });

    let signer = PrivateKeySigner::random();
    let mut tx = TxLegacy {
        chain_id: Some(1),
        nonce: 4,
        gas_price: 20_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(HUB_A),
        value: U256::ZERO,
        input: Bytes::new(),
    };
    let signature = signer.sign_transaction_sync(&mut tx)?;
    let envelope = TxEnvelope::from(tx.into_signed(signature));
    let signed_tx = alloy::primitives::hex::encode_prefixed(envelope.encoded_2718());

    let response = app
        .router
        .clone()
        .oneshot(post_json("/audit", json!({ "SignedTx": signed_tx }).to_string()))
        .await?;
    assert_eq!(body_json(response).await?, json!("OK"));
    assert_eq!(Calls::get(&app.engine.calls.audit), 1);

    let response = app
        .router
        .oneshot(post_json("/audit", json!({ "SignedTx": "zz" }).to_string()))
        .await?;
    let body = body_json(response).await?;
    assert!(error_of(&body).contains("not hex"));
    assert_eq!(Calls::get(&app.engine.calls.audit), 1);
    Ok(())
}

#[tokio::test]
async fn test_metrics_exposes_readiness() -> Result<()> {
    let app = ready_app().await;

    let response = app
        .router
        .oneshot(Request::get("/metrics").body(Body::empty())?)
        .await?;
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let text = String::from_utf8(bytes.to_vec())?;

    assert!(text.contains("relay_ready 1"));
    assert!(text.contains("relay_admission_rejected_total"));
    Ok(())
}
