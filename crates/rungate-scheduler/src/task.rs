//! Task descriptors and their classification axes.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Scheduling priority, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Interrupts lower tiers when preemption is enabled.
    Critical,
    /// Preempts normal and below.
    High,
    /// The default tier.
    Normal,
    /// Best-effort work.
    Low,
    /// Evictable filler work.
    Background,
}

impl Priority {
    /// Numeric rank: critical 5 down to background 1.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 5,
            Priority::High => 4,
            Priority::Normal => 3,
            Priority::Low => 2,
            Priority::Background => 1,
        }
    }

    /// Whether eviction may remove entries of this priority.
    pub fn is_evictable(&self) -> bool {
        matches!(self, Priority::Low | Priority::Background)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Orthogonal queue classification, secondary to priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// A user is waiting on the result.
    Interactive,
    /// The default class.
    Standard,
    /// Bulk work with no latency expectation.
    Batch,
}

impl QueueClass {
    /// Numeric rank: interactive 3 down to batch 1.
    pub fn rank(&self) -> u8 {
        match self {
            QueueClass::Interactive => 3,
            QueueClass::Standard => 2,
            QueueClass::Batch => 1,
        }
    }
}

impl Default for QueueClass {
    fn default() -> Self {
        QueueClass::Standard
    }
}

/// Resource units a task draws while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCost {
    /// In-flight request units.
    pub additional_requests: u32,
    /// LLM slot units.
    pub additional_llm: u32,
}

impl ResourceCost {
    /// Creates an explicit cost.
    pub fn new(additional_requests: u32, additional_llm: u32) -> Self {
        Self {
            additional_requests,
            additional_llm,
        }
    }
}

impl Default for ResourceCost {
    fn default() -> Self {
        Self {
            additional_requests: 1,
            additional_llm: 1,
        }
    }
}

/// Immutable description of a unit of work seeking admission.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Unique identifier; the queue rejects duplicates.
    pub id: String,
    /// Tool or kind name, e.g. "subagent" or "team-run".
    pub kind: String,
    /// Where the request came from, for diagnostics and checkpoints.
    pub source: String,
    /// Groups tasks from one upstream caller for fair share.
    pub tenant_key: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Orthogonal queue class.
    pub queue_class: QueueClass,
    /// Caller's duration estimate, feeding the SJF term.
    pub estimated_duration_ms: u64,
    /// Caller's estimate of provider round trips.
    pub estimated_rounds: u32,
    /// Absolute deadline on the runtime clock, if any.
    pub deadline_ms: Option<u64>,
    /// Resource units drawn while running.
    pub cost: ResourceCost,
    /// Cooperative cancellation signal.
    pub abort: CancellationToken,
    /// Owning workflow run, when launched from one.
    pub ul_task_id: Option<String>,
    /// Provider label, used for the penalty scope and checkpoints.
    pub provider: Option<String>,
    /// Model label, used for the penalty scope and checkpoints.
    pub model: Option<String>,
}

impl TaskDescriptor {
    /// Creates a builder for a task with the given id and kind.
    pub fn builder(id: impl Into<String>, kind: impl Into<String>) -> TaskDescriptorBuilder {
        TaskDescriptorBuilder::new(id, kind)
    }
}

/// Builder for [`TaskDescriptor`].
#[derive(Debug, Clone)]
pub struct TaskDescriptorBuilder {
    id: String,
    kind: String,
    source: String,
    tenant_key: String,
    priority: Priority,
    queue_class: QueueClass,
    estimated_duration_ms: u64,
    estimated_rounds: u32,
    deadline_ms: Option<u64>,
    cost: ResourceCost,
    abort: CancellationToken,
    ul_task_id: Option<String>,
    provider: Option<String>,
    model: Option<String>,
}

impl TaskDescriptorBuilder {
    fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            source: "unknown".to_string(),
            tenant_key: "default".to_string(),
            priority: Priority::default(),
            queue_class: QueueClass::default(),
            estimated_duration_ms: 60_000,
            estimated_rounds: 1,
            deadline_ms: None,
            cost: ResourceCost::default(),
            abort: CancellationToken::new(),
            ul_task_id: None,
            provider: None,
            model: None,
        }
    }

    /// Sets the source context. Default: "unknown".
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets the tenant key. Default: "default".
    pub fn tenant_key(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_key = tenant.into();
        self
    }

    /// Sets the priority. Default: normal.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the queue class. Default: standard.
    pub fn queue_class(mut self, class: QueueClass) -> Self {
        self.queue_class = class;
        self
    }

    /// Sets the estimated duration. Default: 60 000 ms.
    pub fn estimated_duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = ms;
        self
    }

    /// Sets the estimated provider round trips. Default: 1.
    pub fn estimated_rounds(mut self, rounds: u32) -> Self {
        self.estimated_rounds = rounds;
        self
    }

    /// Sets an absolute deadline on the runtime clock.
    pub fn deadline_ms(mut self, deadline: u64) -> Self {
        self.deadline_ms = Some(deadline);
        self
    }

    /// Sets the resource cost. Default: one request, one LLM slot.
    pub fn cost(mut self, cost: ResourceCost) -> Self {
        self.cost = cost;
        self
    }

    /// Supplies the cancellation token. Default: a fresh, never-fired token.
    pub fn abort(mut self, token: CancellationToken) -> Self {
        self.abort = token;
        self
    }

    /// Binds the task to an owning workflow run.
    pub fn ul_task_id(mut self, id: impl Into<String>) -> Self {
        self.ul_task_id = Some(id.into());
        self
    }

    /// Sets the provider label.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the model label.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builds the descriptor.
    pub fn build(self) -> TaskDescriptor {
        TaskDescriptor {
            id: self.id,
            kind: self.kind,
            source: self.source,
            tenant_key: self.tenant_key,
            priority: self.priority,
            queue_class: self.queue_class,
            estimated_duration_ms: self.estimated_duration_ms,
            estimated_rounds: self.estimated_rounds,
            deadline_ms: self.deadline_ms,
            cost: self.cost,
            abort: self.abort,
            ul_task_id: self.ul_task_id,
            provider: self.provider,
            model: self.model,
        }
    }
}
