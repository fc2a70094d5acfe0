pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::tracing::request_id_middleware;
use tower_http::trace::TraceLayer;

use config::Config;
use services::catalog::CachingCatalog;
use services::processor::ProcessorClient;
use services::receipts::ReceiptIssuer;
use services::store::Store;
use services::streams::StreamService;
use services::PaymentLedger;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub catalog: Arc<CachingCatalog>,
    pub processor: ProcessorClient,
    pub ledger: Arc<PaymentLedger>,
    pub receipts: ReceiptIssuer,
    pub streams: StreamService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Application-scoped endpoints
        .route(
            "/applications/:application_id/plan",
            get(handlers::plans::get_plan),
        )
        .route(
            "/applications/:application_id/payments",
            post(handlers::payments::create_payment).get(handlers::payments::list_payments),
        )
        .route(
            "/applications/:application_id/stream",
            get(handlers::stream::application_stream),
        )
        // Payment endpoints
        .route("/payments/:payment_id", get(handlers::payments::get_payment))
        .route(
            "/payments/:payment_id/cancel",
            post(handlers::payments::cancel_payment),
        )
        .route(
            "/payments/:payment_id/card-intent",
            post(handlers::card::create_card_intent),
        )
        .route(
            "/payments/:payment_id/proof",
            post(handlers::manual::submit_proof),
        )
        .route(
            "/payments/:payment_id/approve",
            post(handlers::manual::approve),
        )
        .route(
            "/payments/:payment_id/reject",
            post(handlers::manual::reject),
        )
        .route(
            "/payments/:payment_id/receipt",
            get(handlers::receipts::get_receipt),
        )
        // Processor callback (signature-verified, not actor-authenticated)
        .route(
            "/webhooks/card-processor",
            post(handlers::card::processor_webhook),
        )
        // Staff endpoints
        .route("/staff/stream", get(handlers::stream::staff_stream))
        .route(
            "/staff/schedule-cache/invalidate",
            post(handlers::plans::invalidate_schedule_cache),
        )
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}
