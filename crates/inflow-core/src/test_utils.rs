//! Test utilities for inflow-core
//!
//! Provides a mock provider API server covering the OAuth token endpoint
//! and Plaid-shaped data endpoints. The token endpoint counts refresh
//! grants, which is how the vault's single-flight behavior is asserted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::oneshot;

#[derive(Default)]
struct ServerState {
    refresh_calls: AtomicUsize,
    reject_refresh: AtomicBool,
}

/// Mock provider server for testing
pub struct MockProviderServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockProviderServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());

        let app = Router::new()
            .route("/oauth/token", post(handle_token))
            .route("/accounts/get", post(handle_accounts))
            .route("/transactions/get", post(handle_transactions))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// How many refresh grants the token endpoint has received,
    /// rejected ones included
    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// Make the token endpoint reject refresh grants with 400
    /// (simulates a revoked refresh token)
    pub fn set_reject_refresh(&self, reject: bool) {
        self.state.reject_refresh.store(reject, Ordering::SeqCst);
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_token(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    // Widen the race window so concurrent callers pile up on the keyed lock
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Rejected grants count too: single-flight must hold on the failure
    // path as much as on success
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    if state.reject_refresh.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("refreshed-{}", n),
            "refresh_token": format!("rotated-{}", n),
            "expires_in": 3600,
        })),
    )
}

async fn handle_accounts(State(_state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(json!({
        "accounts": [
            {
                "account_id": "mock-acct-1",
                "name": "Everyday Checking",
                "type": "checking",
                "balances": { "current": 2500.00, "iso_currency_code": "USD" }
            }
        ]
    }))
}

async fn handle_transactions(State(_state): State<Arc<ServerState>>) -> Json<serde_json::Value> {
    Json(json!({
        "transactions": [
            {
                "transaction_id": "mock-tx-1",
                "account_id": "mock-acct-1",
                "amount": 15.99,
                "date": "2026-02-03",
                "name": "NETFLIX.COM 866-579-7172",
                "merchant_name": "Netflix",
                "location": null,
                "personal_finance_category": { "primary": "ENTERTAINMENT" }
            }
        ]
    }))
}
