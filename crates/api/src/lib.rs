//! HTTP API server with observability for the fulfillment backend.
//!
//! Provides REST endpoints for order management and the shipping panel,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::FulfillmentEngine;
use ledger::{InMemoryLedger, Ledger};
use metrics_exporter_prometheus::PrometheusHandle;
use notifier::{
    InMemoryMailer, InMemoryNotificationLog, InMemoryPushGateway, InMemorySubscriptionStore,
    InMemoryUserDirectory, StatusDispatcher,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// The notification dispatcher wired into the server. The channel
/// transports are the in-memory ones; real push and SMTP transports
/// plug in behind the same traits.
pub type AppDispatcher = StatusDispatcher<
    InMemoryNotificationLog,
    InMemorySubscriptionStore,
    InMemoryPushGateway,
    InMemoryMailer,
    InMemoryUserDirectory,
>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: Ledger + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<L>))
        .route("/orders/{id}", get(routes::orders::get::<L>))
        .route("/orders/{id}/shipments", get(routes::orders::shipments::<L>))
        .route("/shipping/orders", get(routes::shipping::list::<L>))
        .route("/shipping/orders/counts", get(routes::shipping::counts::<L>))
        .route(
            "/shipping/orders/{id}/ship",
            post(routes::shipping::ship::<L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state around an existing ledger, wiring the
/// engine to the in-memory notification channels.
pub fn create_state<L: Ledger + 'static>(ledger: Arc<L>) -> Arc<AppState<L>> {
    let notifications = InMemoryNotificationLog::new();
    let subscriptions = InMemorySubscriptionStore::new();
    let push = InMemoryPushGateway::new();
    let mailer = InMemoryMailer::new();
    let directory = InMemoryUserDirectory::new();

    let dispatcher = StatusDispatcher::new(
        notifications.clone(),
        subscriptions,
        push,
        mailer.clone(),
        directory.clone(),
    );
    let engine = FulfillmentEngine::new(Arc::clone(&ledger), Arc::new(dispatcher));

    Arc::new(AppState {
        ledger,
        engine,
        directory,
        notifications,
        mailer,
    })
}

/// Creates the default application state backed by the in-memory ledger.
pub fn create_default_state() -> Arc<AppState<InMemoryLedger>> {
    create_state(Arc::new(InMemoryLedger::new()))
}
