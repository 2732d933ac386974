//! Coordination layer: admission queue, resource locks, dependency graph,
//! and the bounded process pool that actually runs hooks.

pub mod coordinator;
pub mod graph;
pub mod locks;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod types;

pub use coordinator::Coordinator;
pub use pool::{HookInvocation, HookLauncher, LaunchStatus, ProcessLauncher, ProcessPool, RunResult, SlotHandle};
pub use registry::{HookHandler, HookRegistry};
pub use types::{
    CallOpts, CoordinationStatus, ExecutionStats, FailureKind, HookOutcome, HookOutput,
    HookRequest, HookSpec, HookType, LockEntry, PoolStatus, Priority, RejectReason, RequestId,
    RequestStatus, ResourceKey,
};
