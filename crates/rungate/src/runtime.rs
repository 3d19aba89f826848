//! The runtime facade: admission, dispatch, preemption, snapshots.

use crate::checkpoint::{CheckpointRecord, CheckpointStore, InMemoryCheckpointStore};
use crate::config::RuntimeConfig;
use crate::permit::{PermitLease, PermitRequest, PermitResult};
use crate::preempt::{should_preempt, to_base36, PreemptionError, TaskResult};
use rungate_core::classify::{classify, Classification, RawError};
use rungate_core::clock::{Clock, SystemClock};
use rungate_core::hooks::Hooks;
use rungate_ledger::{
    CapacityCheck, CapacityLedger, CapacityLimits, LedgerSnapshot, ReservationLease,
    ResourceTracker, SlotKind,
};
use rungate_penalty::{PenaltyReason, PenaltyRegistry, PenaltySnapshot};
use rungate_scheduler::{
    EnqueueError, EnqueueOutcome, Priority, QueueSnapshot, SchedulerEvent, TaskDescriptor,
    WaitQueue,
};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A dispatched task the runtime is aware of.
#[derive(Debug, Clone)]
pub struct ActiveExecution {
    /// Task id.
    pub task_id: String,
    /// Tool or kind name.
    pub kind: String,
    /// Source context, carried into checkpoints.
    pub source: String,
    /// Tenant key.
    pub tenant_key: String,
    /// Priority the task runs at.
    pub priority: Priority,
    /// Counter family the task draws from.
    pub slot_kind: SlotKind,
    /// Owning workflow run, when any.
    pub ul_task_id: Option<String>,
    /// Provider label.
    pub provider: Option<String>,
    /// Model label.
    pub model: Option<String>,
    /// Cooperative cancellation handle.
    pub abort: CancellationToken,
    /// When the task dispatched, on the runtime clock.
    pub dispatched_at_ms: u64,
}

/// Read-only view across the ledger, queue, and execution table.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    /// The configured limits.
    pub limits: CapacityLimits,
    /// Stable version of those limits.
    pub limits_version: String,
    /// Ledger counters.
    pub ledger: LedgerSnapshot,
    /// Queue statistics, including per-priority pending counts.
    pub queue: QueueSnapshot,
    /// Number of tasks currently executing.
    pub active_executions: usize,
    /// Dispatch walks currently in flight.
    pub active_orchestrations: u32,
}

pub(crate) enum WaiterGrant {
    Dispatched(PermitLease),
    Evicted { reasons: Vec<String> },
}

pub(crate) struct Waiter {
    sender: oneshot::Sender<WaiterGrant>,
    slot_kind: SlotKind,
}

pub(crate) struct SchedState {
    pub(crate) queue: WaitQueue,
    pub(crate) waiters: HashMap<String, Waiter>,
    pub(crate) active: HashMap<String, ActiveExecution>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ledger: CapacityLedger,
    pub(crate) penalties: PenaltyRegistry,
    pub(crate) checkpoints: Arc<dyn CheckpointStore>,
    pub(crate) tracker: ResourceTracker,
    pub(crate) sched: Mutex<SchedState>,
    pub(crate) hooks: Hooks<SchedulerEvent>,
    /// Dispatch walkers currently claimed, bounded by
    /// `max_concurrent_orchestrations`.
    pub(crate) orchestrations: AtomicU32,
    /// Set by a pump request that found the walkers saturated; a retiring
    /// walker (or the next poll tick) picks it up.
    pub(crate) repump: AtomicBool,
}

impl RuntimeInner {
    fn emit(&self, event: SchedulerEvent) {
        self.hooks.fire(&event);
    }
}

/// Per-run fairness violations for a task, given the current active table.
fn per_run_reasons(
    config: &RuntimeConfig,
    active: &HashMap<String, ActiveExecution>,
    task: &TaskDescriptor,
    slot_kind: SlotKind,
) -> Vec<String> {
    let Some(owner) = task.ul_task_id.as_deref() else {
        return Vec::new();
    };
    let siblings = active
        .values()
        .filter(|e| e.slot_kind == slot_kind && e.ul_task_id.as_deref() == Some(owner))
        .count() as u32;

    let mut reasons = Vec::new();
    match slot_kind {
        SlotKind::Subagent => {
            if siblings >= config.limits.max_parallel_subagents_per_run {
                reasons.push(format!(
                    "run {owner} already has {siblings} parallel subagents (limit {})",
                    config.limits.max_parallel_subagents_per_run
                ));
            }
        }
        SlotKind::Team => {
            if siblings >= config.limits.max_parallel_teams_per_run {
                reasons.push(format!(
                    "run {owner} already has {siblings} parallel teams (limit {})",
                    config.limits.max_parallel_teams_per_run
                ));
            }
        }
    }
    reasons
}

/// Demands that can never be satisfied, regardless of load.
fn impossible_reasons(
    config: &RuntimeConfig,
    task: &TaskDescriptor,
    slot_kind: SlotKind,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if task.cost.additional_requests > config.limits.max_total_active_requests {
        reasons.push(format!(
            "cost of {} requests exceeds max_total_active_requests {}",
            task.cost.additional_requests, config.limits.max_total_active_requests
        ));
    }
    if task.cost.additional_llm > config.limits.max_total_active_llm {
        reasons.push(format!(
            "cost of {} llm slots exceeds max_total_active_llm {}",
            task.cost.additional_llm, config.limits.max_total_active_llm
        ));
    }
    if slot_kind == SlotKind::Team
        && task.cost.additional_llm > config.limits.max_parallel_team_members_per_team
    {
        reasons.push(format!(
            "team of {} members exceeds max_parallel_team_members_per_team {}",
            task.cost.additional_llm, config.limits.max_parallel_team_members_per_team
        ));
    }
    reasons
}

fn fits_locked(
    inner: &RuntimeInner,
    active: &HashMap<String, ActiveExecution>,
    task: &TaskDescriptor,
    slot_kind: SlotKind,
) -> bool {
    if !inner
        .ledger
        .check_capacity(task.cost.additional_requests, task.cost.additional_llm)
        .allowed
    {
        return false;
    }
    per_run_reasons(&inner.config, active, task, slot_kind).is_empty()
}

/// Commits a dispatch: reserves and consumes slots in one ledger operation
/// and registers the execution. Returns `None` if capacity raced away.
fn dispatch_locked(
    inner: &Arc<RuntimeInner>,
    active: &mut HashMap<String, ActiveExecution>,
    task: &TaskDescriptor,
    slot_kind: SlotKind,
    now_ms: u64,
) -> Option<PermitLease> {
    let reservation: ReservationLease = inner.ledger.reserve_and_consume(
        &task.kind,
        slot_kind,
        task.cost.additional_requests,
        task.cost.additional_llm,
        inner.config.reservation_ttl_ms,
    )?;

    let tracker_id = inner
        .tracker
        .track("permit-lease", Some(task.id.clone()));

    active.insert(
        task.id.clone(),
        ActiveExecution {
            task_id: task.id.clone(),
            kind: task.kind.clone(),
            source: task.source.clone(),
            tenant_key: task.tenant_key.clone(),
            priority: task.priority,
            slot_kind,
            ul_task_id: task.ul_task_id.clone(),
            provider: task.provider.clone(),
            model: task.model.clone(),
            abort: task.abort.clone(),
            dispatched_at_ms: now_ms,
        },
    );

    Some(PermitLease::new(
        Arc::clone(inner),
        task.id.clone(),
        slot_kind,
        task.cost,
        reservation,
        tracker_id,
    ))
}

/// Requests a dispatch walk over the waiting queue. Invoked on release,
/// enqueue, and the poll tick.
///
/// Concurrent walkers are bounded by `max_concurrent_orchestrations`: a
/// caller claims a walker token before touching the scheduler state. When
/// the walkers are saturated the request is recorded in the `repump` flag
/// instead; every walker re-checks that flag before and after retiring, so
/// the deferred work is picked up as soon as a token frees (the poll tick
/// backstops the one window where all walkers retired in between).
pub(crate) fn pump(inner: &Arc<RuntimeInner>) {
    let max_walkers = inner.config.limits.max_concurrent_orchestrations;
    inner.repump.store(true, Ordering::SeqCst);

    loop {
        let mut claimed = false;
        let mut walkers = inner.orchestrations.load(Ordering::SeqCst);
        while walkers < max_walkers {
            match inner.orchestrations.compare_exchange(
                walkers,
                walkers + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    claimed = true;
                    break;
                }
                Err(observed) => walkers = observed,
            }
        }
        if !claimed {
            return;
        }

        while inner.repump.swap(false, Ordering::SeqCst) {
            run_dispatch_walk(inner);
        }
        inner.orchestrations.fetch_sub(1, Ordering::SeqCst);

        // a pump request may have landed between the final swap and the
        // token release; take another pass so it is not stranded
        if !inner.repump.load(Ordering::SeqCst) {
            return;
        }
    }
}

/// One walk over the queue: dispatch entries while they fit. The walk runs
/// to completion under the scheduler lock; grants are delivered after it
/// drops.
fn run_dispatch_walk(inner: &Arc<RuntimeInner>) {
    let mut granted: Vec<(oneshot::Sender<WaiterGrant>, PermitLease, String, u64)> = Vec::new();
    {
        let mut sched = inner.sched.lock().expect("scheduler state poisoned");

        loop {
            let now_ms = inner.clock.now_ms();
            let SchedState {
                queue,
                waiters,
                active,
            } = &mut *sched;

            let picked = queue.pick_next(now_ms, |entry| {
                let Some(waiter) = waiters.get(&entry.task.id) else {
                    // orphaned entry (waiter already gone); treat as fitting
                    // so it gets removed below
                    return true;
                };
                fits_locked(inner, active, &entry.task, waiter.slot_kind)
            });
            let Some(entry) = picked else {
                break;
            };

            let Some(waiter) = waiters.remove(&entry.task.id) else {
                continue;
            };

            match dispatch_locked(inner, active, &entry.task, waiter.slot_kind, now_ms) {
                Some(lease) => {
                    let waited_ms = now_ms.saturating_sub(entry.enqueued_at_ms);
                    granted.push((waiter.sender, lease, entry.task.id.clone(), waited_ms));
                }
                None => {
                    // capacity raced away between the fits check and the
                    // reservation; put everything back and stop the walk
                    waiters.insert(entry.task.id.clone(), waiter);
                    queue.restore(entry);
                    break;
                }
            }
        }
    }

    for (sender, lease, task_id, waited_ms) in granted {
        match sender.send(WaiterGrant::Dispatched(lease)) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                metrics::counter!("rungate_permits_granted_total").increment(1);

                inner.emit(SchedulerEvent::Dispatched { task_id, waited_ms });
            }
            Err(WaiterGrant::Dispatched(lease)) => {
                // the waiter gave up (timeout or abort) in the meantime
                lease.release();
            }
            Err(WaiterGrant::Evicted { .. }) => {}
        }
    }
}

fn remove_waiter(inner: &RuntimeInner, task_id: &str) {
    let mut sched = inner.sched.lock().expect("scheduler state poisoned");
    sched.queue.remove(task_id);
    sched.waiters.remove(task_id);
}

/// The concurrent agent-execution runtime.
///
/// One `Runtime` is shared process-wide by every caller needing admission;
/// clones are cheap handles onto the same state. There is no global
/// instance: construct one and thread it through.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Creates a runtime with the in-memory checkpoint store and system clock.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::builder(config).build()
    }

    /// Creates a builder for customizing collaborators.
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// The runtime's configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The runtime's clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Current time on the runtime clock.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Read-only view of counters, limits, and queue statistics.
    pub fn snapshot(&self) -> RuntimeSnapshot {
        let ledger = self.inner.ledger.snapshot();
        let (queue, active_executions) = {
            let sched = self.inner.sched.lock().expect("scheduler state poisoned");
            (sched.queue.snapshot(), sched.active.len())
        };
        RuntimeSnapshot {
            limits: self.inner.config.limits.clone(),
            limits_version: ledger.limits_version.clone(),
            ledger,
            queue,
            active_executions,
            active_orchestrations: self.inner.orchestrations.load(Ordering::SeqCst),
        }
    }

    /// Non-reserving capacity probe.
    pub fn check_capacity(&self, add_req: u32, add_llm: u32) -> CapacityCheck {
        self.inner.ledger.check_capacity(add_req, add_llm)
    }

    /// Raw TTL reservation against the ledger, bypassing the queue.
    pub fn reserve_capacity(
        &self,
        tool: &str,
        add_req: u32,
        add_llm: u32,
        ttl_ms: u64,
    ) -> Option<ReservationLease> {
        self.inner.ledger.reserve(tool, add_req, add_llm, ttl_ms)
    }

    /// Requests permission to run.
    ///
    /// Grants immediately when capacity allows and the queue does not demand
    /// otherwise; queues and waits cooperatively otherwise. Expected
    /// failures (timeout, abort, eviction) come back as a [`PermitResult`],
    /// never as a panic or error.
    pub async fn acquire_permit(&self, request: PermitRequest) -> PermitResult {
        let inner = &self.inner;
        let start_ms = inner.clock.now_ms();
        let task = request.task;
        let slot_kind = request.slot_kind;

        if task.abort.is_cancelled() {
            return PermitResult::aborted(0);
        }

        let impossible = impossible_reasons(&inner.config, &task, slot_kind);
        if !impossible.is_empty() {
            return PermitResult::denied(impossible, 0);
        }

        // fast path and enqueue under one lock acquisition
        let mut evicted_waiters: Vec<(Waiter, String)> = Vec::new();
        let rx = {
            let mut sched = inner.sched.lock().expect("scheduler state poisoned");
            let SchedState {
                queue,
                waiters,
                active,
            } = &mut *sched;

            if (queue.is_empty() || queue.outscores_all(&task, start_ms))
                && fits_locked(inner, active, &task, slot_kind)
            {
                if let Some(lease) = dispatch_locked(inner, active, &task, slot_kind, start_ms) {
                    drop(sched);

                    #[cfg(feature = "metrics")]
                    metrics::counter!("rungate_permits_granted_total").increment(1);

                    inner.emit(SchedulerEvent::Dispatched {
                        task_id: task.id.clone(),
                        waited_ms: 0,
                    });
                    return PermitResult::allowed(lease, 0);
                }
            }

            match queue.enqueue(task.clone(), start_ms) {
                Err(EnqueueError::DuplicateId(id)) => {
                    return PermitResult::denied(vec![format!("task {id} is already queued")], 0);
                }
                Ok(EnqueueOutcome::Refused { reason }) => {
                    return PermitResult::denied(vec![reason], 0);
                }
                Ok(EnqueueOutcome::Enqueued { evicted }) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.insert(
                        task.id.clone(),
                        Waiter {
                            sender: tx,
                            slot_kind,
                        },
                    );
                    for entry in evicted {
                        if let Some(waiter) = waiters.remove(&entry.task.id) {
                            evicted_waiters.push((waiter, entry.task.id));
                        }
                    }
                    rx
                }
            }
        };

        for (waiter, task_id) in evicted_waiters {
            let _ = waiter.sender.send(WaiterGrant::Evicted {
                reasons: vec!["capacity-exhausted-and-queue-full".to_string()],
            });

            #[cfg(feature = "metrics")]
            metrics::counter!("rungate_queue_evictions_total").increment(1);

            inner.emit(SchedulerEvent::Evicted { task_id });
        }

        inner.emit(SchedulerEvent::Enqueued {
            task_id: task.id.clone(),
            priority: task.priority,
            queue_depth: {
                let sched = inner.sched.lock().expect("scheduler state poisoned");
                sched.queue.len()
            },
        });

        // the new head might fit right away
        pump(inner);

        let max_wait_ms = request
            .max_wait_ms
            .unwrap_or(inner.config.limits.capacity_wait_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(max_wait_ms);
        let poll = Duration::from_millis(inner.config.limits.capacity_poll_ms);
        let mut rx = rx;

        loop {
            tokio::select! {
                grant = &mut rx => {
                    let waited_ms = inner.clock.now_ms().saturating_sub(start_ms);
                    return match grant {
                        Ok(WaiterGrant::Dispatched(lease)) => PermitResult::allowed(lease, waited_ms),
                        Ok(WaiterGrant::Evicted { reasons }) => PermitResult::denied(reasons, waited_ms),
                        Err(_) => PermitResult::denied(
                            vec!["dispatch channel closed".to_string()],
                            waited_ms,
                        ),
                    };
                }
                _ = task.abort.cancelled() => {
                    remove_waiter(inner, &task.id);
                    // a grant may have crossed the removal
                    if let Ok(WaiterGrant::Dispatched(lease)) = rx.try_recv() {
                        lease.release();
                    }
                    let waited_ms = inner.clock.now_ms().saturating_sub(start_ms);
                    inner.emit(SchedulerEvent::Aborted {
                        task_id: task.id.clone(),
                    });
                    return PermitResult::aborted(waited_ms);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    remove_waiter(inner, &task.id);
                    if let Ok(WaiterGrant::Dispatched(lease)) = rx.try_recv() {
                        lease.release();
                    }
                    let waited_ms = inner.clock.now_ms().saturating_sub(start_ms);

                    #[cfg(feature = "metrics")]
                    metrics::counter!("rungate_permits_timed_out_total").increment(1);

                    inner.emit(SchedulerEvent::TimedOut {
                        task_id: task.id.clone(),
                        waited_ms,
                    });
                    return PermitResult::timed_out(waited_ms);
                }
                _ = tokio::time::sleep(poll) => {
                    // fallback: re-drive dispatch in case a signal was missed
                    pump(inner);
                }
            }
        }
    }

    /// Whether `incoming` may preempt `running` under this configuration.
    pub fn should_preempt(&self, running: Priority, incoming: Priority) -> bool {
        should_preempt(self.inner.config.enable_preemption, running, incoming)
    }

    /// The lowest-priority running task that `incoming` may preempt.
    pub fn find_preemptable(&self, incoming: Priority) -> Option<ActiveExecution> {
        let enabled = self.inner.config.enable_preemption;
        let sched = self.inner.sched.lock().expect("scheduler state poisoned");
        sched
            .active
            .values()
            .filter(|e| should_preempt(enabled, e.priority, incoming))
            .min_by_key(|e| (e.priority.rank(), e.dispatched_at_ms))
            .cloned()
    }

    /// Interrupts a running task and checkpoints its state.
    ///
    /// The task's abort token is cancelled; the task itself shuts down
    /// cooperatively and releases its lease, which frees the slots. A store
    /// failure leaves the task registered so it is not lost.
    pub async fn preempt_task(
        &self,
        task_id: &str,
        reason: &str,
        state: serde_json::Value,
        progress: Option<f64>,
    ) -> Result<String, PreemptionError> {
        let inner = &self.inner;
        if !inner.config.enable_preemption {
            return Err(PreemptionError::Disabled);
        }

        let exec = {
            let sched = inner.sched.lock().expect("scheduler state poisoned");
            sched.active.get(task_id).cloned()
        }
        .ok_or_else(|| PreemptionError::TaskNotFound(task_id.to_string()))?;

        if !exec.abort.is_cancelled() {
            exec.abort.cancel();
        }

        let now_ms = inner.clock.now_ms();
        let mut metadata = BTreeMap::new();
        metadata.insert("preempt_reason".to_string(), reason.to_string());

        let record = CheckpointRecord {
            id: format!("cp-{}-{}", task_id, to_base36(now_ms)),
            task_id: task_id.to_string(),
            source: exec.source.clone(),
            provider: exec.provider.clone(),
            model: exec.model.clone(),
            priority: exec.priority,
            state,
            progress: progress.unwrap_or(0.5).clamp(0.0, 1.0),
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(inner.config.checkpoint_ttl_ms),
            metadata,
        };

        let checkpoint_id = inner.checkpoints.save(record).await?;

        {
            let mut sched = inner.sched.lock().expect("scheduler state poisoned");
            sched.active.remove(task_id);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("rungate_preemptions_total").increment(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(task_id, reason, checkpoint_id, "task preempted");

        inner.emit(SchedulerEvent::Preempted {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
        });

        Ok(checkpoint_id)
    }

    /// Loads a checkpoint and continues the work through `execute`.
    ///
    /// Resumption does not re-enqueue the task; wrap the call in a fresh
    /// [`acquire_permit`](Runtime::acquire_permit) to re-admit it.
    pub async fn resume_from_checkpoint<F, Fut>(&self, checkpoint_id: &str, execute: F) -> TaskResult
    where
        F: FnOnce(CheckpointRecord) -> Fut,
        Fut: Future<Output = Result<serde_json::Value, String>>,
    {
        let started_ms = self.inner.clock.now_ms();
        let elapsed = |clock: &dyn Clock| clock.now_ms().saturating_sub(started_ms);

        let record = match self.inner.checkpoints.load(checkpoint_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return TaskResult {
                    task_id: checkpoint_id.to_string(),
                    success: false,
                    output: None,
                    error: Some(format!("checkpoint {checkpoint_id} not found")),
                    execution_ms: elapsed(&*self.inner.clock),
                }
            }
            Err(err) => {
                return TaskResult {
                    task_id: checkpoint_id.to_string(),
                    success: false,
                    output: None,
                    error: Some(err.to_string()),
                    execution_ms: elapsed(&*self.inner.clock),
                }
            }
        };

        let task_id = record.task_id.clone();
        match execute(record).await {
            Ok(output) => TaskResult {
                task_id,
                success: true,
                output: Some(output),
                error: None,
                execution_ms: elapsed(&*self.inner.clock),
            },
            Err(error) => TaskResult {
                task_id,
                success: false,
                output: None,
                error: Some(error),
                execution_ms: elapsed(&*self.inner.clock),
            },
        }
    }

    /// Classifies a provider failure and raises the scoped penalty when the
    /// category warrants it. Returns the classification for the retry loop.
    pub fn report_failure(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        error: &RawError,
    ) -> Classification {
        let classification = classify(error);
        if let Some(reason) = PenaltyReason::from_category(classification.category) {
            let scope = PenaltyRegistry::scope_for(provider, model);
            self.inner.penalties.controller(&scope).raise(reason);
        }
        classification
    }

    /// Records a success against the scoped penalty controller.
    pub fn report_success(&self, provider: Option<&str>, model: Option<&str>) {
        let scope = PenaltyRegistry::scope_for(provider, model);
        self.inner.penalties.controller(&scope).lower();
    }

    /// Penalty-adjusted parallelism for a scope. Identity in the stable
    /// profile.
    pub fn effective_parallelism(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        base: u32,
    ) -> u32 {
        let scope = PenaltyRegistry::scope_for(provider, model);
        self.inner.penalties.controller(&scope).apply_limit(base)
    }

    /// Current penalty state for a scope.
    pub fn penalty_snapshot(&self, provider: Option<&str>, model: Option<&str>) -> PenaltySnapshot {
        let scope = PenaltyRegistry::scope_for(provider, model);
        self.inner.penalties.controller(&scope).snapshot()
    }

    /// The currently running tasks.
    pub fn active_executions(&self) -> Vec<ActiveExecution> {
        let sched = self.inner.sched.lock().expect("scheduler state poisoned");
        let mut executions: Vec<ActiveExecution> = sched.active.values().cloned().collect();
        executions.sort_by(|a, b| a.dispatched_at_ms.cmp(&b.dispatched_at_ms));
        executions
    }

    /// Deregisters an execution without touching its slots. Idempotent.
    pub fn remove_active_execution(&self, task_id: &str) -> bool {
        let mut sched = self.inner.sched.lock().expect("scheduler state poisoned");
        sched.active.remove(task_id).is_some()
    }

    /// Emits the leak-detector shutdown summary; returns the leak count.
    pub fn shutdown_report(&self) -> usize {
        self.inner.tracker.report_leaks()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Runtime")
            .field("name", &self.inner.config.name)
            .field("active_requests", &snapshot.ledger.total_active_requests)
            .field("pending", &snapshot.queue.pending)
            .finish()
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    hooks: Hooks<SchedulerEvent>,
}

impl RuntimeBuilder {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            checkpoints: None,
            hooks: Hooks::new(),
        }
    }

    /// Sets the clock. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the checkpoint store. Default: [`InMemoryCheckpointStore`].
    pub fn checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Registers a callback for every dispatch, with the wait in ms.
    pub fn on_dispatched<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let SchedulerEvent::Dispatched { task_id, waited_ms } = event {
                f(task_id, *waited_ms);
            }
        });
        self
    }

    /// Registers a callback for evictions.
    pub fn on_evicted<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let SchedulerEvent::Evicted { task_id } = event {
                f(task_id);
            }
        });
        self
    }

    /// Registers a callback for wait timeouts.
    pub fn on_timed_out<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let SchedulerEvent::TimedOut { task_id, waited_ms } = event {
                f(task_id, *waited_ms);
            }
        });
        self
    }

    /// Registers a callback for preemptions, with the operator reason.
    pub fn on_preempted<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.hooks.observe(move |event| {
            if let SchedulerEvent::Preempted { task_id, reason } = event {
                f(task_id, reason);
            }
        });
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Runtime {
        let ledger = CapacityLedger::builder(self.config.limits.clone())
            .name(self.config.name.clone())
            .clock(Arc::clone(&self.clock))
            .build();
        let penalties = PenaltyRegistry::new(self.config.penalty_config(), Arc::clone(&self.clock));
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new(Arc::clone(&self.clock))));
        let tracker =
            ResourceTracker::with_clock(self.config.tracker_enabled, Arc::clone(&self.clock));
        let queue = WaitQueue::new(
            self.config.weights.clone(),
            self.config.queue_cap,
            self.config.anti_starvation_threshold,
        );

        Runtime {
            inner: Arc::new(RuntimeInner {
                config: self.config,
                clock: self.clock,
                ledger,
                penalties,
                checkpoints,
                tracker,
                sched: Mutex::new(SchedState {
                    queue,
                    waiters: HashMap::new(),
                    active: HashMap::new(),
                }),
                hooks: self.hooks,
                orchestrations: AtomicU32::new(0),
                repump: AtomicBool::new(false),
            }),
        }
    }
}
