// Property-based tests for the dispatch cycle

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::db::NotificationStore;
use common::dispatch::{DispatchConfig, DispatchEngine, Dispatcher};
use common::errors::{DatabaseError, PushError, StorageError};
use common::lock::{DistributedLock, LockGuard};
use common::models::{PushMessage, ScheduledNotification, SendOutcome};
use common::push::PushSender;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// Mock implementations for testing

/// In-memory notification store
struct MemoryStore {
    records: tokio::sync::Mutex<Vec<ScheduledNotification>>,
}

impl MemoryStore {
    fn new(records: Vec<ScheduledNotification>) -> Self {
        Self {
            records: tokio::sync::Mutex::new(records),
        }
    }

    async fn remaining(&self) -> Vec<ScheduledNotification> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn query_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledNotification>, DatabaseError> {
        let records = self.records.lock().await;
        Ok(records.iter().filter(|n| n.is_due(now)).cloned().collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.records.lock().await.retain(|n| n.id != id);
        Ok(())
    }

    async fn insert(&self, notification: &ScheduledNotification) -> Result<(), DatabaseError> {
        self.records.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Push sender that records every batch it receives
struct RecordingSender {
    batches: tokio::sync::Mutex<Vec<Vec<PushMessage>>>,
    fail_batch: bool,
}

impl RecordingSender {
    fn new(fail_batch: bool) -> Self {
        Self {
            batches: tokio::sync::Mutex::new(Vec::new()),
            fail_batch,
        }
    }

    async fn batches(&self) -> Vec<Vec<PushMessage>> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<SendOutcome>, PushError> {
        self.batches.lock().await.push(messages.to_vec());
        if self.fail_batch {
            return Err(PushError::Transport("push endpoint down".to_string()));
        }
        Ok(messages
            .iter()
            .map(|m| SendOutcome::delivered(m.token.clone()))
            .collect())
    }
}

/// Lock that always grants acquisition
struct OpenLock;

#[async_trait]
impl DistributedLock for OpenLock {
    async fn acquire(&self, resource: &str, _ttl: Duration) -> Result<LockGuard, StorageError> {
        Ok(LockGuard::detached(resource))
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()
}

fn build_engine(
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
) -> DispatchEngine {
    DispatchEngine::new(
        DispatchConfig::default(),
        store,
        sender,
        Arc::new(OpenLock),
    )
}

/// Strategy for a record with an offset (seconds) around the evaluation time
fn notification_strategy() -> impl Strategy<Value = (i64, String, String)> {
    (
        -3600i64..3600i64,
        "[a-z ]{1,24}",
        "[a-zA-Z0-9]{8,24}",
    )
}

fn materialize(specs: &[(i64, String, String)]) -> Vec<ScheduledNotification> {
    specs
        .iter()
        .map(|(offset, message, token)| ScheduledNotification {
            id: Uuid::new_v4(),
            timestamp: fixed_now() + ChronoDuration::seconds(*offset),
            message: message.clone(),
            fcm_token: token.clone(),
            created_at: fixed_now() - ChronoDuration::hours(1),
        })
        .collect()
}

/// *For any* set of stored records, after one cycle every record due at
/// evaluation time is absent from the store and every future record is
/// untouched.
#[test]
fn property_due_records_deleted_future_records_untouched() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    proptest!(|(specs in proptest::collection::vec(notification_strategy(), 0..40))| {
        rt.block_on(async {
            let records = materialize(&specs);
            let due_count = records.iter().filter(|n| n.is_due(fixed_now())).count();
            let future_ids: Vec<Uuid> = records
                .iter()
                .filter(|n| !n.is_due(fixed_now()))
                .map(|n| n.id)
                .collect();

            let store = Arc::new(MemoryStore::new(records));
            let sender = Arc::new(RecordingSender::new(false));
            let engine = build_engine(store.clone(), sender.clone());

            let summary = engine.run_cycle(fixed_now()).await.unwrap();

            prop_assert_eq!(summary.sent, due_count);
            prop_assert_eq!(summary.deleted, due_count);
            prop_assert_eq!(summary.delete_failures, 0);

            let remaining = store.remaining().await;
            prop_assert_eq!(remaining.len(), future_ids.len());
            for n in &remaining {
                prop_assert!(future_ids.contains(&n.id));
            }
            Ok(())
        })?;
    });
}

/// *For any* non-empty due set, exactly one batch call is made carrying one
/// reminder message per record with the fixed title; an empty due set makes
/// no batch call at all.
#[test]
fn property_single_batch_with_reminder_shape() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    proptest!(|(specs in proptest::collection::vec(notification_strategy(), 0..40))| {
        rt.block_on(async {
            let records = materialize(&specs);
            let due: Vec<ScheduledNotification> = records
                .iter()
                .filter(|n| n.is_due(fixed_now()))
                .cloned()
                .collect();

            let store = Arc::new(MemoryStore::new(records));
            let sender = Arc::new(RecordingSender::new(false));
            let engine = build_engine(store, sender.clone());

            engine.run_cycle(fixed_now()).await.unwrap();

            let batches = sender.batches().await;
            if due.is_empty() {
                prop_assert!(batches.is_empty());
            } else {
                prop_assert_eq!(batches.len(), 1);
                prop_assert_eq!(batches[0].len(), due.len());
                for (msg, rec) in batches[0].iter().zip(due.iter()) {
                    prop_assert_eq!(&msg.title, "Scheduled Reminder");
                    prop_assert_eq!(&msg.body, &rec.message);
                    prop_assert_eq!(&msg.token, &rec.fcm_token);
                }
            }
            Ok(())
        })?;
    });
}

/// *For any* set of records, running the cycle twice with no inserts in
/// between sends nothing on the second run.
#[test]
fn property_idempotence_of_absence() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    proptest!(|(specs in proptest::collection::vec(notification_strategy(), 0..40))| {
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new(materialize(&specs)));
            let sender = Arc::new(RecordingSender::new(false));
            let engine = build_engine(store, sender.clone());

            engine.run_cycle(fixed_now()).await.unwrap();
            let second = engine.run_cycle(fixed_now()).await.unwrap();

            prop_assert_eq!(second.sent, 0);
            prop_assert!(!second.any_sent());
            Ok(())
        })?;
    });
}

/// *For any* due set, a whole-batch send failure still deletes every
/// observed record; the storage lifecycle is independent of delivery.
#[test]
fn property_send_failure_does_not_block_deletion() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    proptest!(|(specs in proptest::collection::vec(notification_strategy(), 1..40))| {
        rt.block_on(async {
            let records = materialize(&specs);
            let due_count = records.iter().filter(|n| n.is_due(fixed_now())).count();

            let store = Arc::new(MemoryStore::new(records));
            let sender = Arc::new(RecordingSender::new(true));
            let engine = build_engine(store.clone(), sender);

            let summary = engine.run_cycle(fixed_now()).await.unwrap();

            prop_assert_eq!(summary.sent, due_count);
            prop_assert_eq!(summary.deleted, due_count);
            let remaining = store.remaining().await;
            prop_assert!(remaining.iter().all(|n| !n.is_due(fixed_now())));
            Ok(())
        })?;
    });
}

/// The concrete scenario from the service contract: one record due a minute
/// ago yields one reminder and an empty store.
#[tokio::test]
async fn scenario_single_due_record() {
    let record = ScheduledNotification {
        id: Uuid::new_v4(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        message: "Hi".to_string(),
        fcm_token: "tok1".to_string(),
        created_at: Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap(),
    };
    let store = Arc::new(MemoryStore::new(vec![record]));
    let sender = Arc::new(RecordingSender::new(false));
    let engine = build_engine(store.clone(), sender.clone());

    let summary = engine.run_cycle(fixed_now()).await.unwrap();

    assert_eq!(summary.sent, 1);
    assert!(summary.any_sent());

    let batches = sender.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0][0],
        PushMessage {
            title: "Scheduled Reminder".to_string(),
            body: "Hi".to_string(),
            token: "tok1".to_string(),
        }
    );
    assert!(store.remaining().await.is_empty());
}
