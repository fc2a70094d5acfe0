//! Application startup and lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use service_core::error::AppError;

use crate::config::{Config, StoreBackend};
use crate::services::catalog::{CachingCatalog, StoreCatalog};
use crate::services::clock::SystemClock;
use crate::services::gateways::{CardGateway, ManualGateway};
use crate::services::processor::ProcessorClient;
use crate::services::receipts::{spawn_receipt_monitor, ReceiptIssuer};
use crate::services::store::{MemoryStore, PgStore, Store};
use crate::services::streams::StreamService;
use crate::services::{init_metrics, ChangeFeed, PaymentLedger};
use crate::{router, AppState};

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with the store named by the configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store: Arc<dyn Store> = match config.store.backend {
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Postgres => {
                let url = config.store.database_url.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("postgres backend needs a database url"))
                })?;
                let store = PgStore::connect(
                    url.expose_secret(),
                    config.store.max_connections,
                    config.store.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(store)
            }
        };
        Self::build_with_store(config, store).await
    }

    /// Build against an already constructed store. Tests use this to seed
    /// the store before the server starts.
    pub async fn build_with_store(
        config: Config,
        store: Arc<dyn Store>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let feed = ChangeFeed::new(config.payments.feed_capacity);
        let catalog = Arc::new(CachingCatalog::new(
            Arc::new(StoreCatalog::new(store.clone())),
            Duration::from_secs(config.payments.schedule_cache_ttl_secs),
            Arc::new(SystemClock),
        ));

        let processor = ProcessorClient::new(config.processor.clone());
        if processor.is_configured() {
            tracing::info!("Card processor client initialized");
        } else {
            tracing::warn!("Card processor credentials not configured - card settlement disabled");
        }
        let card = Arc::new(CardGateway::new(
            processor.clone(),
            Duration::from_secs(config.payments.gateway_timeout_secs),
        ));

        let receipts = ReceiptIssuer::new(store.clone());
        let ledger = Arc::new(PaymentLedger::new(
            store.clone(),
            catalog.clone(),
            card,
            Arc::new(ManualGateway),
            receipts.clone(),
            feed.clone(),
            config.payments.currency.clone(),
        ));

        let shutdown = CancellationToken::new();
        let streams = StreamService::new(
            store.clone(),
            feed.clone(),
            Duration::from_millis(config.payments.aggregate_debounce_ms),
            shutdown.clone(),
        );

        // Safety net behind the inline issuance path: any paid transition
        // seen on the feed gets a receipt even if the inline attempt failed.
        spawn_receipt_monitor(feed.clone(), receipts.clone(), shutdown.clone());

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!(port = port, "Fees service listener bound");

        let state = AppState {
            config,
            store,
            catalog,
            processor,
            ledger,
            receipts,
            streams,
        };

        Ok(Self {
            port,
            listener,
            state,
            shutdown,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Token cancelled when the server stops; background workers watch it.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the application until the server exits, then stop the workers.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let app = router(self.state.clone());
        tracing::info!(port = self.port, "Starting fees service");
        let result = axum::serve(self.listener, app).await;
        self.shutdown.cancel();
        result.map_err(AppError::from)
    }
}
