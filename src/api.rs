use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, TextEncoder};
use tokio::net::ToSocketAddrs;

use crate::metrics::Metrics;

async fn export_metrics(State(metrics): State<Metrics>) -> Response {
    let families = metrics.registry().gather();
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&families, &mut buffer) {
        log::error!("failed to encode metrics: {err}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buffer,
    )
        .into_response()
}

/// Serves the `/metrics` exposition endpoint for external scraping.
pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new(metrics: Metrics) -> Self {
        let router = axum::Router::new()
            .route("/metrics", get(export_metrics))
            .with_state(metrics);
        Self { router }
    }

    pub async fn listen(self, addr: impl ToSocketAddrs) {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("TCP Listener bind");
        axum::serve(listener, self.router.into_make_service())
            .await
            .unwrap()
    }
}
