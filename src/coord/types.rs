//! Core types for hook coordination.
//!
//! Everything the scheduler, pool, and callers exchange lives here: request
//! descriptors, the typed outcome sum, and the status snapshots returned by
//! the coordination status surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Monotonic request identifier, assigned by the scheduler at admission.
/// Doubles as the FIFO tie-breaker within a priority tier.
pub type RequestId = u64;

/// Lifecycle hook types fired around agent operations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    PreTask,
    PostTask,
    PreEdit,
    PostEdit,
    PreRead,
    Notify,
    SessionStart,
    SessionEnd,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreTask => "pre_task",
            Self::PostTask => "post_task",
            Self::PreEdit => "pre_edit",
            Self::PostEdit => "post_edit",
            Self::PreRead => "pre_read",
            Self::Notify => "notify",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
        }
    }

    pub fn all() -> [HookType; 8] {
        [
            Self::PreTask,
            Self::PostTask,
            Self::PreEdit,
            Self::PostEdit,
            Self::PreRead,
            Self::Notify,
            Self::SessionStart,
            Self::SessionEnd,
        ]
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request priority. The derived ordering is heap rank: `High` sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

/// The identifier a hook's exclusivity is scoped to.
///
/// The derived `Ord` gives the canonical acquisition order for multi-key
/// requests, preventing circular waits across overlapping key sets.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResourceKey {
    File(String),
    Task(String),
    Session(String),
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(p) => write!(f, "file:{}", p),
            Self::Task(t) => write!(f, "task:{}", t),
            Self::Session(s) => write!(f, "session:{}", s),
        }
    }
}

/// Request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Locked,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Rejected,
    Reset,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Locked | Self::Running)
    }
}

/// What the caller asked for, before the scheduler assigns an id.
#[derive(Debug, Clone)]
pub struct HookSpec {
    pub hook_type: HookType,
    pub args: Vec<String>,
    pub priority: Priority,
    pub resource_keys: Vec<ResourceKey>,
    pub timeout: Duration,
}

/// An admitted hook request. Owned by the scheduler until terminal;
/// immutable except for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRequest {
    pub id: RequestId,
    pub hook_type: HookType,
    pub args: Vec<String>,
    pub priority: Priority,
    pub resource_keys: Vec<ResourceKey>,
    pub timeout: Duration,
    pub enqueued_at: DateTime<Utc>,
    pub status: RequestStatus,
}

impl HookRequest {
    pub fn from_spec(id: RequestId, spec: HookSpec) -> Self {
        let mut resource_keys = spec.resource_keys;
        resource_keys.sort();
        resource_keys.dedup();
        Self {
            id,
            hook_type: spec.hook_type,
            args: spec.args,
            priority: spec.priority,
            resource_keys,
            timeout: spec.timeout,
            enqueued_at: Utc::now(),
            status: RequestStatus::Queued,
        }
    }
}

/// Per-call overrides accepted by the facade and coordinator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallOpts {
    pub priority: Option<Priority>,
    pub timeout: Option<Duration>,
}

impl CallOpts {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Canonical hash of (hook type, normalized args) used for stampede
/// deduplication of in-flight requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn compute(hook_type: HookType, args: &[String]) -> Self {
        let mut hasher = DefaultHasher::new();
        hook_type.as_str().hash(&mut hasher);
        for arg in args {
            arg.trim().hash(&mut hasher);
        }
        Self(hasher.finish())
    }
}

/// Captured output of a hook process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Why a hook that ran (or tried to run) counts as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Process exited with a non-zero code
    NonZeroExit(i32),
    /// Force-terminated when the shutdown grace period expired
    ShutdownForced,
    /// The process could not be spawned at all
    SpawnFailed(String),
}

/// Why a request was refused at admission time, before any side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Admitting the request's dependency edges would close a cycle
    CircularDependency,
    /// The queue is closed for shutdown
    ShuttingDown,
    /// No executable is registered for this hook type
    UnregisteredHook,
    /// The request arguments fail validation
    InvalidArgs(String),
}

/// Terminal outcome of a hook request. Callers pattern-match; the engine
/// never throws for an expected terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Succeeded(HookOutput),
    Failed(FailureKind),
    TimedOut,
    Rejected(RejectReason),
    Reset,
}

impl HookOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// Terminal request status this outcome maps to
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Succeeded(_) => RequestStatus::Succeeded,
            Self::Failed(_) => RequestStatus::Failed,
            Self::TimedOut => RequestStatus::TimedOut,
            Self::Rejected(_) => RequestStatus::Rejected,
            Self::Reset => RequestStatus::Reset,
        }
    }
}

/// Aggregate execution counters per hook type. Survives resets; this is
/// monitoring data, not scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub reset: u64,
    pub total_duration_ms: u64,
}

impl ExecutionStats {
    pub fn record(&mut self, outcome: &HookOutcome) {
        self.total += 1;
        match outcome {
            HookOutcome::Succeeded(output) => {
                self.succeeded += 1;
                self.total_duration_ms += output.duration.as_millis() as u64;
            }
            HookOutcome::Failed(_) => self.failed += 1,
            HookOutcome::TimedOut => self.timed_out += 1,
            HookOutcome::Rejected(_) => self.rejected += 1,
            HookOutcome::Reset => self.reset += 1,
        }
    }

    /// Mean duration of succeeded executions, in milliseconds
    pub fn avg_duration_ms(&self) -> u64 {
        if self.succeeded == 0 {
            0
        } else {
            self.total_duration_ms / self.succeeded
        }
    }
}

/// One entry in the lock-table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub resource: String,
    pub holder: RequestId,
}

/// Pool utilization snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
}

/// Aggregate coordination state, derived on demand from the scheduler and
/// pool. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationStatus {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub locks: Vec<LockEntry>,
    pub pool: PoolStatus,
    pub stats: BTreeMap<String, ExecutionStats>,
}
