use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use service_core::error::AppError;

use crate::models::{FeeSchedule, ScheduleKey};
use crate::services::clock::Clock;
use crate::services::metrics;
use crate::services::store::Store;

/// Read side of the pricing catalog. Missing schedules surface as
/// `AppError::NotFound`; the caller decides whether that is fatal.
#[async_trait]
pub trait PricingCatalog: Send + Sync {
    async fn schedule(&self, key: &ScheduleKey) -> Result<Arc<FeeSchedule>, AppError>;
}

/// Catalog reading straight from the store.
pub struct StoreCatalog {
    store: Arc<dyn Store>,
}

impl StoreCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PricingCatalog for StoreCatalog {
    async fn schedule(&self, key: &ScheduleKey) -> Result<Arc<FeeSchedule>, AppError> {
        let schedule = self.store.fee_schedule(key).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "no fee schedule for service '{}' in jurisdiction '{}' under the {} plan",
                key.service,
                key.jurisdiction,
                key.plan.as_str()
            ))
        })?;
        Ok(Arc::new(schedule))
    }
}

struct CacheEntry {
    schedule: Arc<FeeSchedule>,
    fetched_at: Instant,
}

/// Read-through cache over another catalog. Entries are served until the TTL
/// lapses, so a catalog edit can take up to one TTL to become visible unless
/// `invalidate_all` is called. Lookup failures are never cached.
pub struct CachingCatalog {
    inner: Arc<dyn PricingCatalog>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<ScheduleKey, CacheEntry>>,
}

impl CachingCatalog {
    pub fn new(inner: Arc<dyn PricingCatalog>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every cached schedule. The next lookup per key goes to the
    /// backing catalog.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
        tracing::info!("Fee schedule cache invalidated");
    }
}

#[async_trait]
impl PricingCatalog for CachingCatalog {
    async fn schedule(&self, key: &ScheduleKey) -> Result<Arc<FeeSchedule>, AppError> {
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if now.duration_since(entry.fetched_at) < self.ttl {
                    metrics::CATALOG_LOOKUPS.with_label_values(&["hit"]).inc();
                    return Ok(entry.schedule.clone());
                }
            }
        }

        let schedule = self.inner.schedule(key).await?;
        metrics::CATALOG_LOOKUPS.with_label_values(&["miss"]).inc();

        let mut entries = self.entries.write().await;
        entries.insert(
            key.clone(),
            CacheEntry {
                schedule: schedule.clone(),
                fetched_at: now,
            },
        );
        Ok(schedule)
    }
}
