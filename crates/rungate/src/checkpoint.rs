//! Durable checkpoints for preempted tasks.

use async_trait::async_trait;
use rungate_core::clock::Clock;
use rungate_scheduler::Priority;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Default checkpoint time-to-live: 24 hours.
pub const DEFAULT_CHECKPOINT_TTL_MS: u64 = 24 * 60 * 60 * 1_000;

/// Durable record of a preempted task's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Checkpoint id, `cp-{task_id}-{timestamp base36}`.
    pub id: String,
    /// The preempted task.
    pub task_id: String,
    /// Source context of the task.
    pub source: String,
    /// Provider label, when known.
    pub provider: Option<String>,
    /// Model label, when known.
    pub model: Option<String>,
    /// Priority the task ran at.
    pub priority: Priority,
    /// Opaque state blob supplied by the task.
    pub state: serde_json::Value,
    /// Fraction of work completed, in [0, 1].
    pub progress: f64,
    /// When the checkpoint was written, on the runtime clock.
    pub created_at_ms: u64,
    /// When the checkpoint expires.
    pub expires_at_ms: u64,
    /// Free-form metadata; `preempt_reason` records why the task stopped.
    pub metadata: BTreeMap<String, String>,
}

/// Errors from a checkpoint store backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckpointStoreError {
    /// The backend failed to persist or load a record.
    #[error("checkpoint store failure: {0}")]
    Backend(String),
}

/// Collaborator interface for checkpoint persistence.
///
/// Any durable key-value store works; records are expected to expire on
/// their own after `expires_at_ms`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists a record, returning its id.
    async fn save(&self, record: CheckpointRecord) -> Result<String, CheckpointStoreError>;

    /// Loads a record by id; `None` when absent or expired.
    async fn load(&self, id: &str) -> Result<Option<CheckpointRecord>, CheckpointStoreError>;
}

/// In-process checkpoint store with TTL expiry.
///
/// The default store; suitable for tests and single-process deployments.
/// Expired records are dropped lazily on load and by [`sweep_expired`].
///
/// [`sweep_expired`]: InMemoryCheckpointStore::sweep_expired
pub struct InMemoryCheckpointStore {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, CheckpointRecord>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store on the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Drops expired records; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut records = self.records.lock().expect("checkpoint store poisoned");
        let before = records.len();
        records.retain(|_, r| r.expires_at_ms > now_ms);
        before - records.len()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.lock().expect("checkpoint store poisoned").len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, record: CheckpointRecord) -> Result<String, CheckpointStoreError> {
        let id = record.id.clone();
        let mut records = self.records.lock().expect("checkpoint store poisoned");
        records.insert(id.clone(), record);
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<Option<CheckpointRecord>, CheckpointStoreError> {
        let now_ms = self.clock.now_ms();
        let mut records = self.records.lock().expect("checkpoint store poisoned");
        match records.get(id) {
            Some(record) if record.expires_at_ms <= now_ms => {
                records.remove(id);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }
}
