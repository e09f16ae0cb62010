//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::invocation::InvocationOutcome;
use crate::metrics;

/// Relay statistics shared between the watch loop and the HTTP server
#[derive(Debug, Default, Clone)]
pub struct RelayerStats {
    pub source_chain: String,
    pub mint_chain: String,
    pub relayer_address: String,
    /// Completed invocations, including failed scans
    pub invocations: u64,
    pub burns_found: u64,
    pub mints_submitted: u64,
    pub failed_scans: u64,
    /// Last persisted cursor
    pub last_cursor: Option<u64>,
    pub last_message: String,
}

impl RelayerStats {
    /// Fold one invocation into the running totals
    pub fn record(&mut self, outcome: &InvocationOutcome) {
        self.invocations += 1;
        match outcome {
            InvocationOutcome::Relayed { relay, .. } => {
                self.burns_found += relay.total as u64;
            }
            InvocationOutcome::FetchFailed { .. } => self.failed_scans += 1,
            _ => {}
        }
        self.mints_submitted += outcome.minted() as u64;
        if let Some(cursor) = outcome.persisted_cursor() {
            self.last_cursor = Some(cursor);
        }
        self.last_message = outcome.result().message;
    }
}

pub type SharedStats = Arc<RwLock<RelayerStats>>;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub source_chain: String,
    pub mint_chain: String,
    pub relayer_address: String,
    pub invocations: u64,
    pub burns_found: u64,
    pub mints_submitted: u64,
    pub failed_scans: u64,
    pub last_cursor: Option<u64>,
    pub last_message: String,
}

async fn health_check(State(stats): State<SharedStats>) -> Json<HealthResponse> {
    let stats = stats.read().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        source_chain: stats.source_chain.clone(),
        mint_chain: stats.mint_chain.clone(),
        relayer_address: stats.relayer_address.clone(),
        invocations: stats.invocations,
        burns_found: stats.burns_found,
        mints_submitted: stats.mints_submitted,
        failed_scans: stats.failed_scans,
        last_cursor: stats.last_cursor,
        last_message: stats.last_message.clone(),
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe: ready once a cursor has been persisted
async fn readiness(State(stats): State<SharedStats>) -> (StatusCode, &'static str) {
    if stats.read().await.last_cursor.is_some() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(stats)
}

/// Start the HTTP server for health and metrics
pub async fn start_server(bind_address: &str, port: u16, stats: SharedStats) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Health server listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /metrics - Prometheus metrics");

    metrics::UP.set(1.0);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(stats)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionResult;

    async fn serve(stats: SharedStats) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(stats)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_stats_record_fetch_failure() {
        let mut stats = RelayerStats::default();
        stats.record(&InvocationOutcome::FetchFailed {
            cursor: Some(10),
            error: "boom".to_string(),
        });

        assert_eq!(stats.invocations, 1);
        assert_eq!(stats.failed_scans, 1);
        assert_eq!(stats.last_cursor, None);
        assert_eq!(
            stats.last_message,
            ExecutionResult::no_action("Rpc call failed: boom").message
        );
    }

    #[tokio::test]
    async fn test_readiness_follows_cursor() {
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats::default()));
        let base = serve(stats.clone()).await;

        let resp = reqwest::get(format!("{}/readyz", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        stats.write().await.last_cursor = Some(8_000);
        let resp = reqwest::get(format!("{}/readyz", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_and_metrics_endpoints() {
        let stats: SharedStats = Arc::new(RwLock::new(RelayerStats {
            source_chain: "arbitrumSepolia".to_string(),
            mint_chain: "optimismSepolia".to_string(),
            ..Default::default()
        }));
        let base = serve(stats).await;

        let health: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["source_chain"], "arbitrumSepolia");

        metrics::record_mint_submitted("arbitrumSepolia", true);
        let body = reqwest::get(format!("{}/metrics", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("burnmint_mints_submitted_total"));
    }
}
