use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::Payment;
use crate::services::debounce::Debouncer;
use crate::services::feed::{ChangeEvent, ChangeFeed};
use crate::services::metrics;
use crate::services::reconciler::{self, Aggregates, Notice, ReconcileAction, ViewState};
use crate::services::store::Store;

/// What a stream covers: one application's payments, or every payment for
/// the staff dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamScope {
    Application(Uuid),
    Staff,
}

impl StreamScope {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            StreamScope::Staff => true,
            StreamScope::Application(id) => event.application_id() == *id,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            StreamScope::Application(_) => "application",
            StreamScope::Staff => "staff",
        }
    }
}

/// One frame of a reconciled view stream.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub payments: Vec<Payment>,
    pub aggregates: Aggregates,
    /// Notifications raised by this frame's event, if any.
    pub notices: Vec<Notice>,
}

/// Hands out reconciled view streams over the change feed.
///
/// Each subscriber gets its own consumer task that keeps a local view in
/// step with the feed: patch where possible, refetch where not, and resync
/// after any gap. The stream ends when the subscriber goes away or the
/// service shuts down; reconnecting starts from a fresh snapshot.
#[derive(Clone)]
pub struct StreamService {
    store: Arc<dyn Store>,
    feed: ChangeFeed,
    debounce_window: Duration,
    shutdown: CancellationToken,
}

impl StreamService {
    pub fn new(
        store: Arc<dyn Store>,
        feed: ChangeFeed,
        debounce_window: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            feed,
            debounce_window,
            shutdown,
        }
    }

    pub fn subscribe(&self, scope: StreamScope) -> mpsc::Receiver<ViewSnapshot> {
        let (tx, rx) = mpsc::channel(16);
        // Subscribe before the initial fetch so nothing falls in the gap;
        // events older than the fetched rows are absorbed by reconciliation.
        let events = self.feed.subscribe();
        let consumer = Consumer {
            store: self.store.clone(),
            scope,
            debouncer: Debouncer::new(self.debounce_window),
            state: ViewState::new(),
            aggregates: Aggregates::default(),
        };
        let shutdown = self.shutdown.clone();
        tokio::spawn(consumer.run(events, tx, shutdown));
        rx
    }
}

struct Consumer {
    store: Arc<dyn Store>,
    scope: StreamScope,
    debouncer: Debouncer,
    state: ViewState,
    aggregates: Aggregates,
}

impl Consumer {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<ChangeEvent>,
        tx: mpsc::Sender<ViewSnapshot>,
        shutdown: CancellationToken,
    ) {
        if let Err(e) = self.refetch().await {
            tracing::error!(
                scope = %self.scope.as_str(),
                error = %e,
                "Initial view fetch failed; closing stream"
            );
            return;
        }
        if tx.send(self.snapshot(Vec::new())).await.is_err() {
            return;
        }

        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tx.closed() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        if !self.scope.matches(&event) {
                            continue;
                        }
                        if let Some(snapshot) = self.reconcile(&event).await {
                            if tx.send(snapshot).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            scope = %self.scope.as_str(),
                            skipped,
                            "Change feed lagged; resyncing view"
                        );
                        metrics::STREAM_RESYNCS_TOTAL
                            .with_label_values(&["lagged"])
                            .inc();
                        if self.resync().await {
                            if tx.send(self.snapshot(Vec::new())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                // The expression is evaluated even when disarmed, so give
                // it a throwaway instant; the guard keeps it unpolled.
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.debouncer.fire();
                    self.recompute();
                    if tx.send(self.snapshot(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Apply one event. Returns the snapshot to emit, or None when the
    /// event changed nothing worth sending.
    async fn reconcile(&mut self, event: &ChangeEvent) -> Option<ViewSnapshot> {
        let outcome = reconciler::apply(&mut self.state, event);
        match outcome.action {
            ReconcileAction::NeedsRefetch => {
                let reason = match event {
                    ChangeEvent::Insert { .. } => "insert",
                    _ => "missing_row",
                };
                metrics::STREAM_RESYNCS_TOTAL
                    .with_label_values(&[reason])
                    .inc();
                if !self.resync().await {
                    return None;
                }
                Some(self.snapshot(outcome.notice.into_iter().collect()))
            }
            ReconcileAction::Patched | ReconcileAction::Removed => {
                match self.scope {
                    // An application view holds a handful of rows; recompute
                    // in line. The staff view coalesces bursts instead.
                    StreamScope::Application(_) => self.recompute(),
                    StreamScope::Staff => self.debouncer.trigger(Instant::now()),
                }
                Some(self.snapshot(outcome.notice.into_iter().collect()))
            }
            ReconcileAction::Ignored => None,
        }
    }

    async fn refetch(&mut self) -> Result<(), AppError> {
        let rows = match self.scope {
            StreamScope::Staff => self.store.all_payments().await?,
            StreamScope::Application(id) => self.store.payments_for_application(id).await?,
        };
        self.state.replace_all(rows);
        self.recompute();
        // The refetch already recomputed; a pending deadline is satisfied.
        self.debouncer.fire();
        Ok(())
    }

    /// Refetch, keeping the stale view on failure so the stream degrades
    /// instead of dying; the next event retries.
    async fn resync(&mut self) -> bool {
        match self.refetch().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    scope = %self.scope.as_str(),
                    error = %e,
                    "View refetch failed; keeping previous view"
                );
                false
            }
        }
    }

    fn recompute(&mut self) {
        self.aggregates = reconciler::aggregates(&self.state);
        metrics::AGGREGATE_RECOMPUTES_TOTAL
            .with_label_values(&[self.scope.as_str()])
            .inc();
    }

    fn snapshot(&self, notices: Vec<Notice>) -> ViewSnapshot {
        ViewSnapshot {
            payments: self.state.sorted().into_iter().cloned().collect(),
            aggregates: self.aggregates.clone(),
            notices,
        }
    }
}
