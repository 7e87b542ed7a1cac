//! Replication outbox for the external system of record.
//!
//! Writes to the replica are described as ordered [`Mutation`]s, stored as
//! pending rows in `sync_queue` and picked up by a separate queue worker.
//! The worker applies one correlation group at a time in ascending sequence
//! order; nothing here waits for it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::db::{InsertOutcome, OutboxStore};
use crate::models::NewSyncQueueItem;

/// Columns that only mean something to the replica. The system of record
/// rejects payloads carrying fields it does not know.
pub const REPLICA_ONLY_FIELDS: &[&str] = &[
    "created_at",
    "updated_at",
    "synced_at",
    "sync_status",
    "pending",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
        }
    }
}

/// Rows start pending; the queue worker owns every later status.
pub const PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub sequence: i32,
    pub table: String,
    pub record_id: String,
    pub operation: Operation,
    pub payload: Value,
}

impl Mutation {
    pub fn new(
        sequence: i32,
        table: &str,
        record_id: impl ToString,
        operation: Operation,
        payload: Value,
    ) -> Self {
        Self {
            sequence,
            table: table.to_string(),
            record_id: record_id.to_string(),
            operation,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub queued: usize,
    pub duplicates: usize,
    pub failed: usize,
}

pub fn idempotency_key(correlation_id: &str, table: &str, record_id: &str, sequence: i32) -> String {
    format!("{}:{}:{}:{}", correlation_id, table, record_id, sequence)
}

/// Drops replica-only columns and `_`-prefixed internals from an object payload.
pub fn strip_replica_fields(payload: Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with('_') && !REPLICA_ONLY_FIELDS.contains(&key.as_str()))
                .collect(),
        ),
        other => other,
    }
}

/// Nudges the queue worker. Implementations must return immediately.
pub trait QueueTrigger: Send + Sync {
    fn fire(&self, correlation_id: &str);
}

/// POSTs to the queue worker from a detached task.
pub struct HttpQueueTrigger {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    action: &'static str,
    correlation_id: &'a str,
}

impl HttpQueueTrigger {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }
}

impl QueueTrigger for HttpQueueTrigger {
    fn fire(&self, correlation_id: &str) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime, queue trigger skipped for {}", correlation_id);
                return;
            }
        };
        let request = self.client.post(&self.url).json(&TriggerBody {
            action: "process",
            correlation_id,
        });
        let correlation_id = correlation_id.to_string();
        handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("Queue worker accepted trigger for {}", correlation_id);
                }
                Ok(resp) => {
                    warn!(
                        "Queue worker answered {} to trigger for {}",
                        resp.status(),
                        correlation_id
                    );
                }
                Err(e) => {
                    warn!("Queue trigger for {} failed: {}", correlation_id, e);
                }
            }
        });
    }
}

/// Used when no worker URL is configured; queued items wait for the
/// worker's own polling.
pub struct NoopQueueTrigger;

impl QueueTrigger for NoopQueueTrigger {
    fn fire(&self, correlation_id: &str) {
        debug!("Queue trigger disabled, {} left for polling", correlation_id);
    }
}

#[derive(Clone)]
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
    trigger: Arc<dyn QueueTrigger>,
}

impl Outbox {
    pub fn new(store: Arc<dyn OutboxStore>, trigger: Arc<dyn QueueTrigger>) -> Self {
        Self { store, trigger }
    }

    /// Queues every mutation as a pending row and fires the worker trigger.
    /// Never fails: a retried item counts as a duplicate and any other insert
    /// error is logged with enough context to replay it by hand.
    pub fn enqueue(&self, correlation_id: &str, mut mutations: Vec<Mutation>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        if mutations.is_empty() {
            return report;
        }
        mutations.sort_by_key(|m| m.sequence);

        let now = Utc::now();
        for mutation in mutations {
            let key = idempotency_key(
                correlation_id,
                &mutation.table,
                &mutation.record_id,
                mutation.sequence,
            );
            let item = NewSyncQueueItem {
                correlation_id: correlation_id.to_string(),
                sequence: mutation.sequence,
                table_name: mutation.table,
                record_id: mutation.record_id,
                operation: mutation.operation.as_str().to_string(),
                payload: strip_replica_fields(mutation.payload),
                status: PENDING.to_string(),
                idempotency_key: key,
                attempts: 0,
                created_at: now,
            };
            match self.store.insert_pending(&item) {
                Ok(InsertOutcome::Inserted) => report.queued += 1,
                Ok(InsertOutcome::Duplicate) => {
                    debug!("Sync item {} already queued", item.idempotency_key);
                    report.duplicates += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to queue {} {} on {} (key {}): {}",
                        item.operation, item.record_id, item.table_name, item.idempotency_key, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Outbox {}: {} queued, {} already queued, {} failed",
            correlation_id, report.queued, report.duplicates, report.failed
        );
        self.trigger.fire(correlation_id);
        report
    }
}
