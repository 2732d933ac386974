//! Coordinator - the public face of the coordination engine.
//!
//! Maps semantic hook invocations onto queue and pool operations: derives
//! resource keys, validates requests against the registry, and translates
//! scheduler replies into the caller-facing outcome contract.

use crate::coord::pool::ProcessPool;
use crate::coord::queue::SchedulerCommand;
use crate::coord::registry::HookRegistry;
use crate::coord::types::{
    CallOpts, CoordinationStatus, HookOutcome, HookSpec, HookType, PoolStatus, RejectReason,
    ResourceKey,
};
use crate::core::config::EngineConfig;
use crate::core::errors::{LatchError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Derive the exclusivity scope of a hook from its type and arguments.
/// Edit hooks lock the target file, task hooks the task id, session hooks
/// the session id; notify and pre-read hold nothing.
pub(crate) fn derive_resource_keys(hook_type: HookType, args: &[String]) -> Vec<ResourceKey> {
    let first = || args.first().map(|a| a.trim().to_string()).unwrap_or_default();
    match hook_type {
        HookType::PreEdit | HookType::PostEdit => vec![ResourceKey::File(first())],
        HookType::PreTask | HookType::PostTask => vec![ResourceKey::Task(first())],
        HookType::SessionStart | HookType::SessionEnd => vec![ResourceKey::Session(first())],
        HookType::PreRead | HookType::Notify => Vec::new(),
    }
}

/// Whether this hook type requires an identifying first argument.
fn requires_subject(hook_type: HookType) -> bool {
    !matches!(hook_type, HookType::Notify)
}

pub struct Coordinator {
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    pool: Arc<ProcessPool>,
    registry: Arc<HookRegistry>,
    config: EngineConfig,
}

impl Coordinator {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<SchedulerCommand>,
        pool: Arc<ProcessPool>,
        registry: Arc<HookRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cmd_tx,
            pool,
            registry,
            config,
        }
    }

    /// Submit one hook for coordinated execution and suspend until it (or a
    /// stampede-sharing peer) reaches a terminal state.
    ///
    /// Expected terminal states come back as [`HookOutcome`] variants; `Err`
    /// means the engine itself is broken (scheduler gone).
    pub async fn coordinate_hook(
        &self,
        hook_type: HookType,
        args: Vec<String>,
        opts: CallOpts,
    ) -> Result<HookOutcome> {
        if !self.registry.contains(hook_type) {
            debug!(hook = %hook_type, "no handler registered, rejecting");
            return Ok(HookOutcome::Rejected(RejectReason::UnregisteredHook));
        }
        if requires_subject(hook_type) && args.first().map_or(true, |a| a.trim().is_empty()) {
            return Ok(HookOutcome::Rejected(RejectReason::InvalidArgs(format!(
                "{} requires a non-empty subject argument",
                hook_type
            ))));
        }

        let spec = HookSpec {
            hook_type,
            resource_keys: derive_resource_keys(hook_type, &args),
            args,
            priority: opts.priority.unwrap_or(self.config.default_priority),
            timeout: opts.timeout.unwrap_or(self.config.default_timeout),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Enqueue {
                spec,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LatchError::channel_closed("hook admission"))?;
        reply_rx
            .await
            .map_err(|_| LatchError::channel_closed("hook outcome delivery"))
    }

    /// Snapshot of queue depth, in-flight count, lock table, pool
    /// utilization, and per-hook-type execution stats.
    pub async fn status(&self) -> Result<CoordinationStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| LatchError::channel_closed("status query"))?;
        reply_rx
            .await
            .map_err(|_| LatchError::channel_closed("status reply"))
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Unconditional circuit breaker: every outstanding request resolves
    /// with `Reset` and running hook processes are terminated. Returns once
    /// both the queue and the pool report a clean state.
    pub async fn emergency_reset(&self) -> Result<()> {
        info!("emergency reset requested");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Reset { reply: reply_tx })
            .await
            .map_err(|_| LatchError::channel_closed("emergency reset"))?;
        reply_rx
            .await
            .map_err(|_| LatchError::channel_closed("emergency reset reply"))?;

        // The queue is clean; give cancelled workers a moment to vacate
        // their slots so the pool also reports clean.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while self.pool.status().busy > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(())
    }

    /// Graceful shutdown: admission closes immediately, in-flight hooks get
    /// `grace` to drain, stragglers are force-terminated.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SchedulerCommand::Shutdown {
                grace,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LatchError::channel_closed("shutdown"))?;
        reply_rx
            .await
            .map_err(|_| LatchError::channel_closed("shutdown reply"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_edit_hooks_lock_file() {
        let keys = derive_resource_keys(HookType::PreEdit, &owned(&["src/lib.rs"]));
        assert_eq!(keys, vec![ResourceKey::File("src/lib.rs".to_string())]);
        let keys = derive_resource_keys(HookType::PostEdit, &owned(&[" src/lib.rs "]));
        assert_eq!(keys, vec![ResourceKey::File("src/lib.rs".to_string())]);
    }

    #[test]
    fn test_task_and_session_keys() {
        assert_eq!(
            derive_resource_keys(HookType::PostTask, &owned(&["t-9"])),
            vec![ResourceKey::Task("t-9".to_string())]
        );
        assert_eq!(
            derive_resource_keys(HookType::SessionStart, &owned(&["s-1"])),
            vec![ResourceKey::Session("s-1".to_string())]
        );
    }

    #[test]
    fn test_non_exclusive_hooks_hold_nothing() {
        assert!(derive_resource_keys(HookType::Notify, &owned(&["message"])).is_empty());
        assert!(derive_resource_keys(HookType::PreRead, &owned(&["a.rs"])).is_empty());
    }

    #[test]
    fn test_subject_requirements() {
        assert!(requires_subject(HookType::PreEdit));
        assert!(requires_subject(HookType::PreRead));
        assert!(!requires_subject(HookType::Notify));
    }
}
