//! Bounded process pool.
//!
//! Owns a fixed set of execution slots and the mechanics of spawning,
//! monitoring, and terminating external hook processes. Slot bookkeeping is
//! the pool's alone; admission ordering belongs to the scheduler.

use crate::coord::types::{
    FailureKind, HookOutcome, HookOutput, HookType, PoolStatus, RequestId,
};
use crate::core::errors::{LatchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

/// Everything needed to launch one hook process.
#[derive(Debug, Clone)]
pub struct HookInvocation {
    pub request_id: RequestId,
    pub hook_type: HookType,
    pub program: std::path::PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Result of a hook process that ran to completion within its timeout.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// How a launch ended, as seen by the launcher. Timeout handling (including
/// termination of the child) is the launcher's responsibility.
#[derive(Debug, Clone)]
pub enum LaunchStatus {
    Completed(RunResult),
    TimedOut,
}

/// Seam between the pool and the operating system. The production
/// implementation spawns real processes; tests inject in-process fakes.
#[async_trait]
pub trait HookLauncher: Send + Sync {
    async fn run(&self, invocation: &HookInvocation, slot: &SlotHandle) -> Result<LaunchStatus>;
}

/// One execution slot.
#[derive(Debug, Clone)]
pub struct ProcessSlot {
    pub index: usize,
    pub state: SlotState,
    pub pid: Option<u32>,
    pub request_id: Option<RequestId>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Busy,
}

/// Lets a launcher record the child pid on the slot it occupies without
/// owning any other pool state.
pub struct SlotHandle {
    slots: Arc<DashMap<usize, ProcessSlot>>,
    index: usize,
}

impl SlotHandle {
    pub fn set_pid(&self, pid: u32) {
        if let Some(mut slot) = self.slots.get_mut(&self.index) {
            slot.pid = Some(pid);
        }
    }
}

/// Fixed-size pool of execution slots.
pub struct ProcessPool {
    size: usize,
    semaphore: Arc<Semaphore>,
    slots: Arc<DashMap<usize, ProcessSlot>>,
    launcher: Arc<dyn HookLauncher>,
    reset_rx: watch::Receiver<u64>,
    force_rx: watch::Receiver<bool>,
}

impl ProcessPool {
    pub fn new(
        size: usize,
        launcher: Arc<dyn HookLauncher>,
        reset_rx: watch::Receiver<u64>,
        force_rx: watch::Receiver<bool>,
    ) -> Self {
        let slots = Arc::new(DashMap::new());
        for index in 0..size {
            slots.insert(
                index,
                ProcessSlot {
                    index,
                    state: SlotState::Idle,
                    pid: None,
                    request_id: None,
                    started_at: None,
                },
            );
        }
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            slots,
            launcher,
            reset_rx,
            force_rx,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn status(&self) -> PoolStatus {
        let busy = self
            .slots
            .iter()
            .filter(|slot| slot.state == SlotState::Busy)
            .count();
        PoolStatus {
            size: self.size,
            idle: self.size - busy,
            busy,
        }
    }

    /// Run one invocation in a free slot, suspending until one is available.
    /// Always resolves: completion, timeout, reset, and forced shutdown all
    /// map to a terminal [`HookOutcome`].
    pub async fn dispatch(&self, invocation: HookInvocation) -> HookOutcome {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return HookOutcome::Failed(FailureKind::SpawnFailed(
                    "process pool is closed".to_string(),
                ))
            }
        };

        let slot_index = self.claim_slot(&invocation);
        let outcome = self.execute(&invocation, slot_index).await;
        self.release_slot(slot_index);
        drop(permit);
        outcome
    }

    async fn execute(&self, invocation: &HookInvocation, slot_index: usize) -> HookOutcome {
        let slot = SlotHandle {
            slots: self.slots.clone(),
            index: slot_index,
        };
        let mut reset_rx = self.reset_rx.clone();
        let seen_generation = *reset_rx.borrow();
        let mut force_rx = self.force_rx.clone();

        tokio::select! {
            status = self.launcher.run(invocation, &slot) => match status {
                Ok(LaunchStatus::Completed(result)) if result.exit_code == 0 => {
                    HookOutcome::Succeeded(HookOutput {
                        exit_code: result.exit_code,
                        stdout: result.stdout,
                        stderr: result.stderr,
                        duration: result.duration,
                    })
                }
                Ok(LaunchStatus::Completed(result)) => {
                    warn!(
                        request = invocation.request_id,
                        hook = %invocation.hook_type,
                        exit_code = result.exit_code,
                        stderr = %result.stderr.trim(),
                        "hook exited non-zero"
                    );
                    HookOutcome::Failed(FailureKind::NonZeroExit(result.exit_code))
                }
                Ok(LaunchStatus::TimedOut) => {
                    warn!(
                        request = invocation.request_id,
                        hook = %invocation.hook_type,
                        timeout_ms = invocation.timeout.as_millis() as u64,
                        "hook timed out, process terminated"
                    );
                    HookOutcome::TimedOut
                }
                Err(e) => {
                    warn!(request = invocation.request_id, error = %e, "hook spawn failed");
                    HookOutcome::Failed(FailureKind::SpawnFailed(e.to_string()))
                }
            },
            _ = reset_signalled(&mut reset_rx, seen_generation) => {
                debug!(request = invocation.request_id, "hook cancelled by emergency reset");
                HookOutcome::Reset
            }
            _ = force_signalled(&mut force_rx) => {
                debug!(request = invocation.request_id, "hook force-terminated at shutdown");
                HookOutcome::Failed(FailureKind::ShutdownForced)
            }
        }
    }

    fn claim_slot(&self, invocation: &HookInvocation) -> usize {
        for index in 0..self.size {
            if let Some(mut slot) = self.slots.get_mut(&index) {
                if slot.state == SlotState::Idle {
                    slot.state = SlotState::Busy;
                    slot.pid = None;
                    slot.request_id = Some(invocation.request_id);
                    slot.started_at = Some(Utc::now());
                    return index;
                }
            }
        }
        // Unreachable while the semaphore bound holds; degrade to unslotted.
        warn!(request = invocation.request_id, "no idle slot found under semaphore permit");
        usize::MAX
    }

    fn release_slot(&self, index: usize) {
        if let Some(mut slot) = self.slots.get_mut(&index) {
            slot.state = SlotState::Idle;
            slot.pid = None;
            slot.request_id = None;
            slot.started_at = None;
        }
    }
}

/// Resolves when a reset newer than `seen` is broadcast. Pends forever if the
/// sender is gone; the launcher branch still guarantees liveness.
async fn reset_signalled(rx: &mut watch::Receiver<u64>, seen: u64) {
    loop {
        if *rx.borrow() > seen {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn force_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Production launcher: spawns the handler executable with captured stdio.
///
/// On timeout the child is killed and reaped best-effort within `kill_grace`;
/// the slot is reclaimed whether or not the exit is confirmed.
pub struct ProcessLauncher {
    kill_grace: Duration,
}

impl ProcessLauncher {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }
}

#[async_trait]
impl HookLauncher for ProcessLauncher {
    async fn run(&self, invocation: &HookInvocation, slot: &SlotHandle) -> Result<LaunchStatus> {
        let started = std::time::Instant::now();
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            LatchError::io(format!("spawn {}", invocation.program.display()), e)
        })?;
        if let Some(pid) = child.id() {
            slot.set_pid(pid);
        }

        // Drain pipes concurrently so a chatty hook cannot fill them and stall.
        let stdout_task = tokio::spawn(drain_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(drain_pipe(child.stderr.take()));

        match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                Ok(LaunchStatus::Completed(RunResult {
                    exit_code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                    duration: started.elapsed(),
                }))
            }
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                Err(LatchError::io("wait for hook process", e))
            }
            Err(_elapsed) => {
                if let Err(e) = child.start_kill() {
                    debug!(request = invocation.request_id, error = %e, "kill after timeout failed");
                }
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_err()
                {
                    warn!(
                        request = invocation.request_id,
                        "timed-out hook did not confirm exit within kill grace, abandoning reap"
                    );
                }
                stdout_task.abort();
                stderr_task.abort();
                Ok(LaunchStatus::TimedOut)
            }
        }
    }
}

async fn drain_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buffer = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buffer).await;
    }
    buffer
}
