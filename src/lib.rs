//! # Latch
//!
//! A hook execution coordination engine for agent tooling. Hooks are
//! external executables that fire around agent actions (task start/end,
//! file edits, session lifecycle); Latch serializes the ones that conflict
//! and runs the rest in parallel.
//!
//! What the engine coordinates:
//!
//! - **Priority admission**: requests enter a priority queue (high, medium,
//!   low) with FIFO ordering inside each class.
//! - **Resource locking**: edit hooks lock their file, task hooks their task
//!   id, session hooks their session id. Conflicting hooks never overlap.
//! - **Hook pairing**: a configurable rule table generates
//!   must-complete-before edges (pre-edit before post-edit on the same file,
//!   and so on) checked for cycles at admission.
//! - **Bounded execution**: hook processes run in a fixed-size slot pool
//!   with per-request timeouts and kill-on-timeout.
//! - **Stampede dedup**: identical concurrent requests coalesce onto one
//!   execution; every caller receives the shared outcome.
//! - **Recovery**: emergency reset aborts everything; graceful shutdown
//!   drains with a grace period then force-terminates.
//!
//! ```no_run
//! use latch::{CallOpts, HookEngineBuilder, HookType};
//!
//! # async fn run() -> latch::Result<()> {
//! let engine = HookEngineBuilder::new()
//!     .register_hook(HookType::PreEdit, "/usr/local/bin/pre-edit", vec![])
//!     .register_hook(HookType::PostEdit, "/usr/local/bin/post-edit", vec![])
//!     .build()?;
//!
//! let outcome = engine.pre_edit("src/main.rs", CallOpts::default()).await?;
//! if outcome.is_success() {
//!     // edit the file, then:
//!     engine.post_edit("src/main.rs", CallOpts::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod core {
    pub mod config;
    pub mod errors;
}

pub mod coord;
pub mod engine;

pub use crate::core::config::{EngineConfig, PairScope, PairingRule, PairingRules};
pub use crate::core::errors::{LatchError, Result};
pub use coord::coordinator::Coordinator;
pub use coord::pool::{HookLauncher, HookInvocation, LaunchStatus, ProcessLauncher, RunResult, SlotHandle};
pub use coord::registry::{HookHandler, HookRegistry};
pub use coord::types::{
    CallOpts, CoordinationStatus, ExecutionStats, FailureKind, HookOutcome, HookOutput,
    HookRequest, HookSpec, HookType, LockEntry, PoolStatus, Priority, RejectReason, RequestId,
    RequestStatus, ResourceKey,
};
pub use engine::{HookEngine, HookEngineBuilder, WorkflowReport, WorkflowStep};
