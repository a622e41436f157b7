// Dispatch engine implementation

use crate::db::NotificationStore;
use crate::errors::DatabaseError;
use crate::lock::DistributedLock;
use crate::models::{DispatchSummary, PushMessage};
use crate::push::PushSender;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Lock resource guarding the dispatch cycle across instances
const DISPATCH_LOCK_RESOURCE: &str = "dispatch:notifications";

/// Configuration for the dispatch engine
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often to poll for due notifications (in seconds)
    pub poll_interval_seconds: u64,
    /// TTL for the dispatch lock (in seconds)
    pub lock_ttl_seconds: u64,
    /// Maximum number of notifications to dispatch per cycle
    pub max_notifications_per_poll: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            lock_ttl_seconds: 55,
            max_notifications_per_poll: 500,
        }
    }
}

/// Dispatcher trait for notification dispatch operations
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Start the polling loop
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the polling loop gracefully
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Run a single dispatch cycle evaluated at `now`
    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<DispatchSummary, DatabaseError>;
}

/// Main dispatch engine implementation
///
/// Collaborators are injected; the engine owns no store or sender state and
/// keeps nothing between cycles. Durability lives entirely in the store.
pub struct DispatchEngine {
    config: DispatchConfig,
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    lock: Arc<dyn DistributedLock>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl DispatchEngine {
    /// Create a new dispatch engine
    pub fn new(
        config: DispatchConfig,
        store: Arc<dyn NotificationStore>,
        sender: Arc<dyn PushSender>,
        lock: Arc<dyn DistributedLock>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            store,
            sender,
            lock,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run one lock-guarded tick of the polling loop
    ///
    /// An instance that cannot acquire the lock skips the tick; another
    /// instance is already dispatching and double-dispatch of the same due
    /// records must be avoided.
    async fn run_guarded_tick(&self) {
        let lock_ttl = Duration::from_secs(self.config.lock_ttl_seconds);

        let guard = match self.lock.acquire(DISPATCH_LOCK_RESOURCE, lock_ttl).await {
            Ok(guard) => guard,
            Err(e) => {
                debug!(error = %e, "Dispatch lock unavailable, skipping tick");
                return;
            }
        };

        match self.run_cycle(Utc::now()).await {
            Ok(summary) => {
                if summary.any_sent() {
                    info!(
                        sent = summary.sent,
                        deleted = summary.deleted,
                        delete_failures = summary.delete_failures,
                        "Notifications sent"
                    );
                } else {
                    debug!("No notifications to send");
                }
            }
            Err(e) => {
                error!(error = %e, "Dispatch cycle failed");
            }
        }

        debug!(
            lock_held_ms = guard.elapsed().as_millis() as u64,
            "Releasing dispatch lock"
        );
        drop(guard);
    }
}

#[async_trait]
impl Dispatcher for DispatchEngine {
    /// Start the polling loop
    ///
    /// Polls every `poll_interval_seconds` until a shutdown signal arrives.
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            "Starting dispatch engine"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_seconds));
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    debug!("Polling for due notifications");
                    self.run_guarded_tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("Dispatch engine stopped");
        Ok(())
    }

    /// Stop the polling loop gracefully
    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping dispatch engine");

        let _ = self.shutdown_tx.send(());

        // Give in-flight cycle work a moment to finish
        sleep(Duration::from_secs(2)).await;

        info!("Dispatch engine stopped gracefully");
        Ok(())
    }

    /// Run a single dispatch cycle
    ///
    /// Queries the store for records due at `now`, hands them to the push
    /// collaborator as one batch, then deletes every observed record. The
    /// deletion is keyed on "was read as due", not on confirmed delivery, so
    /// send failures do not keep records alive; the loss window is logged.
    /// Only a failed query aborts the cycle.
    #[instrument(skip(self))]
    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<DispatchSummary, DatabaseError> {
        let started = Instant::now();

        // Point-in-time snapshot; records becoming due after this query wait
        // for the next cycle.
        let mut due = match self.store.query_due(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to query due notifications");
                return Err(e);
            }
        };

        if due.len() > self.config.max_notifications_per_poll {
            warn!(
                due = due.len(),
                cap = self.config.max_notifications_per_poll,
                "Due notifications exceed per-cycle cap, deferring remainder"
            );
            due.truncate(self.config.max_notifications_per_poll);
        }

        telemetry::update_due_count(due.len());
        debug!(count = due.len(), "Found due notifications");

        // Build the batch in store order, pairing each message with its
        // record id for the deletion pass.
        let messages: Vec<PushMessage> = due.iter().map(PushMessage::reminder).collect();
        let ids: Vec<_> = due.iter().map(|n| n.id).collect();

        let mut summary = DispatchSummary {
            sent: messages.len(),
            ..DispatchSummary::default()
        };

        if !messages.is_empty() {
            match self.sender.send_batch(&messages).await {
                Ok(outcomes) => {
                    let failed = outcomes.iter().filter(|o| !o.success).count();
                    if failed > 0 {
                        for outcome in outcomes.iter().filter(|o| !o.success) {
                            warn!(
                                token = %outcome.token,
                                error = outcome.error.as_deref().unwrap_or("unknown"),
                                "Push message failed delivery"
                            );
                        }
                        telemetry::record_send_failures(failed);
                    }
                    telemetry::record_sent(messages.len());
                }
                Err(e) => {
                    // Records will still be deleted below; these messages are
                    // lost rather than redelivered.
                    error!(
                        error = %e,
                        batch_size = messages.len(),
                        "Batch send failed, dispatched records will not be redelivered"
                    );
                    telemetry::record_send_failures(messages.len());
                }
            }
        }

        // Delete every observed record, awaited, collecting failures. A
        // failed delete leaves the record for the next cycle.
        for id in ids {
            match self.store.delete(id).await {
                Ok(()) => summary.deleted += 1,
                Err(e) => {
                    warn!(notification_id = %id, error = %e, "Failed to delete dispatched record");
                    summary.delete_failures += 1;
                }
            }
        }

        telemetry::record_deleted(summary.deleted);
        if summary.delete_failures > 0 {
            telemetry::record_delete_failures(summary.delete_failures);
        }
        telemetry::record_cycle_duration(started.elapsed().as_secs_f64());

        Ok(summary)
    }
}
