#![allow(dead_code)]

use std::sync::Arc;

use fees_service::config::{
    CardProcessorConfig, Config, PaymentsConfig, ServerConfig, StoreBackend, StoreConfig,
};
use fees_service::models::{ApplicationProfile, FeeSchedule, PaymentPlan, ScheduleKey, ScheduleLineItem};
use fees_service::services::MemoryStore;
use fees_service::startup::Application;
use fees_service::AppState;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::Secret;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_PAYER_ID: &str = "payer-001";
pub const TEST_STAFF_ID: &str = "staff-007";
pub const TEST_SERVICE: &str = "licensure-exam";
pub const TEST_JURISDICTION: &str = "NCR";

pub struct TestApp {
    pub http_address: String,
    pub port: u16,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    shutdown: CancellationToken,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // A base URL that resolves nowhere; tests that need the processor
        // use spawn_with_processor and point it at a mock server.
        Self::spawn_with_processor("http://127.0.0.1:1/v1").await
    }

    pub async fn spawn_with_processor(api_base_url: &str) -> Self {
        let config = Config {
            service_name: "fees-service-test".to_string(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                database_url: None,
                max_connections: 1,
                min_connections: 1,
            },
            processor: CardProcessorConfig {
                key_id: "pk_test".to_string(),
                key_secret: Secret::new("sk_test".to_string()),
                webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
                api_base_url: api_base_url.to_string(),
                request_timeout_secs: 2,
            },
            payments: PaymentsConfig {
                currency: "PHP".to_string(),
                schedule_cache_ttl_secs: 300,
                aggregate_debounce_ms: 50,
                gateway_timeout_secs: 1,
                feed_capacity: 64,
            },
        };

        let store = Arc::new(MemoryStore::new());
        let app = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let state = app.state();
        let shutdown = app.shutdown_handle();
        let http_address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the HTTP server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            port,
            state,
            store,
            shutdown,
        }
    }

    /// Seed an application profile plus schedules for all three plans, and
    /// return the new application id.
    pub async fn seed_application(&self, hint: Option<PaymentPlan>) -> Uuid {
        self.seed_application_with(hint, totals_schedule()).await
    }

    pub async fn seed_application_with(
        &self,
        hint: Option<PaymentPlan>,
        schedule: FeeSchedule,
    ) -> Uuid {
        let application_id = Uuid::new_v4();
        self.store
            .seed_application(ApplicationProfile {
                application_id,
                service: TEST_SERVICE.to_string(),
                jurisdiction: TEST_JURISDICTION.to_string(),
                payment_type_hint: hint,
            })
            .await;
        for plan in [PaymentPlan::Staggered, PaymentPlan::Full, PaymentPlan::Retake] {
            self.store
                .seed_schedule(schedule_key(plan), schedule.clone())
                .await;
        }
        application_id
    }

    /// Sign a callback body the way the processor does.
    pub fn sign_callback(&self, body: &str) -> String {
        type HmacSha256 = Hmac<sha2::Sha256>;
        let mut mac = HmacSha256::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Stop background stream consumers and the receipt monitor.
    pub async fn cleanup(&self) {
        self.shutdown.cancel();
    }
}

pub fn schedule_key(plan: PaymentPlan) -> ScheduleKey {
    ScheduleKey {
        service: TEST_SERVICE.to_string(),
        jurisdiction: TEST_JURISDICTION.to_string(),
        plan,
    }
}

/// Schedule priced by totals only: 500 / 700 / 1100.
pub fn totals_schedule() -> FeeSchedule {
    FeeSchedule {
        total_step1: Some(Decimal::new(500_00, 2)),
        total_step2: Some(Decimal::new(700_00, 2)),
        total_full: Some(Decimal::new(1100_00, 2)),
        ..Default::default()
    }
}

/// Schedule priced by line items, step 2 carrying a taxable line:
/// 625.00 + 12% tax = 700.00.
pub fn itemized_schedule() -> FeeSchedule {
    FeeSchedule {
        line_items: vec![
            ScheduleLineItem {
                description: "Step 1 assessment".to_string(),
                amount: Decimal::new(500_00, 2),
                step: Some(1),
                taxable: false,
            },
            ScheduleLineItem {
                description: "Step 2 assessment".to_string(),
                amount: Decimal::new(625_00, 2),
                step: Some(2),
                taxable: true,
            },
        ],
        ..Default::default()
    }
}

/// Attach the gateway identity headers for a payer request.
pub fn as_payer(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("X-Actor-Id", TEST_PAYER_ID)
}

/// Attach the gateway identity headers for a staff request.
pub fn as_staff(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("X-Actor-Id", TEST_STAFF_ID)
        .header("X-Actor-Role", "staff")
}
