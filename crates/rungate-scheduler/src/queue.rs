//! The waiting queue.

use crate::score::ScoreWeights;
use crate::task::{Priority, TaskDescriptor};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A queued admission request.
#[derive(Debug, Clone)]
pub struct WaitEntry {
    /// The task seeking admission.
    pub task: TaskDescriptor,
    /// When the entry joined the queue, on the runtime clock.
    pub enqueued_at_ms: u64,
    /// Times this entry was passed over during dispatch walks.
    pub skip_count: u32,
}

/// Counts of pending entries grouped by priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityStats {
    /// Pending critical entries.
    pub critical: usize,
    /// Pending high entries.
    pub high: usize,
    /// Pending normal entries.
    pub normal: usize,
    /// Pending low entries.
    pub low: usize,
    /// Pending background entries.
    pub background: usize,
}

impl PriorityStats {
    fn bump(&mut self, priority: Priority) {
        *self.slot(priority) += 1;
    }

    fn drop(&mut self, priority: Priority) {
        let slot = self.slot(priority);
        *slot = slot.saturating_sub(1);
    }

    fn slot(&mut self, priority: Priority) -> &mut usize {
        match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
            Priority::Background => &mut self.background,
        }
    }

    /// The count for one priority.
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
            Priority::Background => self.background,
        }
    }

    /// Total pending entries.
    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low + self.background
    }
}

/// Errors from enqueueing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnqueueError {
    /// An entry with the same id is already pending.
    #[error("task {0} is already queued")]
    DuplicateId(String),
}

/// What happened to an accepted or refused enqueue.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The entry joined the queue; `evicted` holds any entry displaced to
    /// make room.
    Enqueued {
        /// Entries evicted to admit the newcomer.
        evicted: Vec<WaitEntry>,
    },
    /// The queue is full and nothing (including the newcomer) could be
    /// displaced in its favor.
    Refused {
        /// Why the entry was refused.
        reason: String,
    },
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    /// Pending entry count.
    pub pending: usize,
    /// Entries evicted since construction.
    pub evicted_entries: u64,
    /// Pending entries grouped by priority.
    pub priority_stats: PriorityStats,
    /// Tenant of the most recent dispatch.
    pub last_dispatched_tenant: Option<String>,
    /// Length of the current same-tenant dispatch run.
    pub consecutive_dispatches: u32,
}

/// Priority waiting queue with hybrid scoring, tenant anti-starvation, and
/// bounded eviction.
///
/// Entries are kept in enqueue order; scores are recomputed at dequeue time
/// and sorted with a stable sort, so equal scores dispatch in enqueue order.
pub struct WaitQueue {
    weights: ScoreWeights,
    queue_cap: usize,
    anti_starvation_threshold: u32,
    entries: Vec<WaitEntry>,
    last_dispatched_tenant: Option<String>,
    consecutive_dispatches: u32,
    dispatch_counts: HashMap<String, u64>,
    evicted_entries: u64,
    priority_stats: PriorityStats,
}

impl WaitQueue {
    /// Creates a queue with the given scoring weights, size cap, and
    /// anti-starvation threshold.
    pub fn new(weights: ScoreWeights, queue_cap: usize, anti_starvation_threshold: u32) -> Self {
        Self {
            weights,
            queue_cap: queue_cap.max(1),
            anti_starvation_threshold: anti_starvation_threshold.max(1),
            entries: Vec::new(),
            last_dispatched_tenant: None,
            consecutive_dispatches: 0,
            dispatch_counts: HashMap::new(),
            evicted_entries: 0,
            priority_stats: PriorityStats::default(),
        }
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this id is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.task.id == id)
    }

    fn score_of(&self, entry: &WaitEntry, now_ms: u64) -> f64 {
        self.weights.score(entry, now_ms, &self.dispatch_counts)
    }

    /// Whether `task` would strictly outscore every pending entry.
    /// Vacuously true for an empty queue.
    pub fn outscores_all(&self, task: &TaskDescriptor, now_ms: u64) -> bool {
        let incoming = WaitEntry {
            task: task.clone(),
            enqueued_at_ms: now_ms,
            skip_count: 0,
        };
        let incoming_score = self.score_of(&incoming, now_ms);
        self.entries
            .iter()
            .all(|e| incoming_score > self.score_of(e, now_ms))
    }

    /// Adds a task at the tail, evicting the lowest-scored evictable entry
    /// when the queue is at capacity. Critical entries are never evicted;
    /// score ties evict the oldest entry.
    pub fn enqueue(
        &mut self,
        task: TaskDescriptor,
        now_ms: u64,
    ) -> Result<EnqueueOutcome, EnqueueError> {
        if self.contains(&task.id) {
            return Err(EnqueueError::DuplicateId(task.id));
        }

        let mut evicted = Vec::new();
        if self.entries.len() >= self.queue_cap {
            let victim_idx = self.eviction_candidate(now_ms);
            let Some(victim_idx) = victim_idx else {
                return Ok(EnqueueOutcome::Refused {
                    reason: "capacity-exhausted-and-queue-full".to_string(),
                });
            };

            if task.priority.is_evictable() {
                let incoming = WaitEntry {
                    task: task.clone(),
                    enqueued_at_ms: now_ms,
                    skip_count: 0,
                };
                let incoming_score = self.score_of(&incoming, now_ms);
                let victim_score = self.score_of(&self.entries[victim_idx], now_ms);
                if incoming_score < victim_score {
                    return Ok(EnqueueOutcome::Refused {
                        reason: "capacity-exhausted-and-queue-full".to_string(),
                    });
                }
            }

            let victim = self.entries.remove(victim_idx);
            self.priority_stats.drop(victim.task.priority);
            self.evicted_entries += 1;

            #[cfg(feature = "metrics")]
            metrics::counter!("rungate_queue_evicted_entries_total").increment(1);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                task_id = %victim.task.id,
                "evicted waiting task to admit newcomer"
            );

            evicted.push(victim);
        }

        self.priority_stats.bump(task.priority);
        self.entries.push(WaitEntry {
            task,
            enqueued_at_ms: now_ms,
            skip_count: 0,
        });
        Ok(EnqueueOutcome::Enqueued { evicted })
    }

    /// Lowest-scored evictable entry; ties broken oldest-first.
    fn eviction_candidate(&self, now_ms: u64) -> Option<usize> {
        let mut best: Option<(usize, f64, u64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if !entry.task.priority.is_evictable() {
                continue;
            }
            let score = self.score_of(entry, now_ms);
            let replace = match best {
                None => true,
                Some((_, best_score, best_enqueued)) => {
                    match score.partial_cmp(&best_score).unwrap_or(Ordering::Equal) {
                        Ordering::Less => true,
                        Ordering::Equal => entry.enqueued_at_ms < best_enqueued,
                        Ordering::Greater => false,
                    }
                }
            };
            if replace {
                best = Some((idx, score, entry.enqueued_at_ms));
            }
        }
        best.map(|(idx, _, _)| idx)
    }

    /// Removes and returns the next entry to dispatch, or `None` when no
    /// pending entry currently fits.
    ///
    /// The walk recomputes scores, visits entries in descending score order
    /// (stable for ties), skips entries `fits` rejects (bumping their skip
    /// count), and applies tenant anti-starvation: once a tenant has taken
    /// `anti_starvation_threshold` consecutive dispatches, a fitting entry
    /// from another tenant is preferred when one exists. Critical entries
    /// bypass anti-starvation.
    pub fn pick_next<F>(&mut self, now_ms: u64, mut fits: F) -> Option<WaitEntry>
    where
        F: FnMut(&WaitEntry) -> bool,
    {
        if self.entries.is_empty() {
            return None;
        }

        let scores: Vec<f64> = self
            .entries
            .iter()
            .map(|e| self.score_of(e, now_ms))
            .collect();
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        // stable: equal scores keep enqueue order
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

        let mut capacity_skipped: Vec<usize> = Vec::new();
        let mut candidate: Option<(usize, usize)> = None; // (order position, entry index)
        for (pos, &idx) in order.iter().enumerate() {
            if fits(&self.entries[idx]) {
                candidate = Some((pos, idx));
                break;
            }
            capacity_skipped.push(idx);
        }
        let (candidate_pos, candidate_idx) = candidate?;

        let mut chosen_idx = candidate_idx;
        let mut passed_over: Option<usize> = None;
        if let Some(last) = self.last_dispatched_tenant.clone() {
            let candidate_entry = &self.entries[candidate_idx];
            if candidate_entry.task.priority != Priority::Critical
                && candidate_entry.task.tenant_key == last
                && self.consecutive_dispatches >= self.anti_starvation_threshold
            {
                for &idx in order.iter().skip(candidate_pos + 1) {
                    if self.entries[idx].task.tenant_key == last {
                        continue;
                    }
                    if fits(&self.entries[idx]) {
                        passed_over = Some(candidate_idx);
                        chosen_idx = idx;
                        break;
                    }
                    capacity_skipped.push(idx);
                }
            }
        }

        for idx in capacity_skipped {
            if idx != chosen_idx {
                self.entries[idx].skip_count += 1;
            }
        }
        if let Some(idx) = passed_over {
            self.entries[idx].skip_count += 1;
        }

        let entry = self.entries.remove(chosen_idx);
        self.priority_stats.drop(entry.task.priority);

        let tenant = entry.task.tenant_key.clone();
        if self.last_dispatched_tenant.as_deref() == Some(tenant.as_str()) {
            self.consecutive_dispatches += 1;
        } else {
            self.consecutive_dispatches = 1;
        }
        self.last_dispatched_tenant = Some(tenant.clone());
        *self.dispatch_counts.entry(tenant).or_insert(0) += 1;

        Some(entry)
    }

    /// Removes a pending entry by id (timeout and abort paths).
    pub fn remove(&mut self, id: &str) -> Option<WaitEntry> {
        let idx = self.entries.iter().position(|e| e.task.id == id)?;
        let entry = self.entries.remove(idx);
        self.priority_stats.drop(entry.task.priority);
        Some(entry)
    }

    /// Reinserts an entry removed by [`pick_next`] whose dispatch could not
    /// complete, preserving its original queue position and skip count.
    pub fn restore(&mut self, entry: WaitEntry) {
        let pos = self
            .entries
            .partition_point(|e| e.enqueued_at_ms <= entry.enqueued_at_ms);
        self.priority_stats.bump(entry.task.priority);
        self.entries.insert(pos, entry);
    }

    /// Pending entry ids in enqueue order (diagnostics and tests).
    pub fn pending_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.task.id.clone()).collect()
    }

    /// Point-in-time view of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.entries.len(),
            evicted_entries: self.evicted_entries,
            priority_stats: self.priority_stats,
            last_dispatched_tenant: self.last_dispatched_tenant.clone(),
            consecutive_dispatches: self.consecutive_dispatches,
        }
    }
}

impl std::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("pending", &self.entries.len())
            .field("cap", &self.queue_cap)
            .field("evicted", &self.evicted_entries)
            .finish()
    }
}
