//! Engine facade and builder.
//!
//! [`HookEngine`] is an explicit, owned instance; embedding applications
//! construct as many engines as they need and nothing is process-global.
//! Build one with [`HookEngineBuilder`], register handlers, then call the
//! per-hook methods or the workflow helpers.

use crate::coord::coordinator::Coordinator;
use crate::coord::pool::{HookLauncher, ProcessLauncher, ProcessPool};
use crate::coord::queue::{Scheduler, SchedulerCommand, WorkerEvent};
use crate::coord::registry::HookRegistry;
use crate::coord::types::{CallOpts, CoordinationStatus, HookOutcome, HookType, PoolStatus};
use crate::core::config::EngineConfig;
use crate::core::errors::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Builder for [`HookEngine`].
///
/// ```no_run
/// use latch::engine::HookEngineBuilder;
/// use latch::coord::types::HookType;
///
/// # async fn build() -> latch::core::errors::Result<()> {
/// let engine = HookEngineBuilder::new()
///     .register_hook(HookType::PreEdit, "/usr/local/bin/pre-edit", vec![])
///     .register_hook(HookType::PostEdit, "/usr/local/bin/post-edit", vec![])
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HookEngineBuilder {
    config: EngineConfig,
    registry: HookRegistry,
    launcher: Option<Arc<dyn HookLauncher>>,
}

impl Default for HookEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HookEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            registry: HookRegistry::new(),
            launcher: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the executable handling `hook_type`. `base_args` always
    /// precede the per-request arguments on the spawned command line.
    pub fn register_hook(
        mut self,
        hook_type: HookType,
        program: impl Into<PathBuf>,
        base_args: Vec<String>,
    ) -> Self {
        self.registry.register(hook_type, program, base_args);
        self
    }

    /// Replace the process launcher. In-process launchers make the engine
    /// testable without spawning real executables.
    pub fn with_launcher(mut self, launcher: Arc<dyn HookLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Validate configuration and registry, wire the channels, and spawn the
    /// scheduler task. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<HookEngine> {
        self.config.validate()?;
        self.registry.validate()?;

        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(ProcessLauncher::new(self.config.kill_grace)));

        let (cmd_tx, cmd_rx) = mpsc::channel::<SchedulerCommand>(self.config.queue_capacity);
        let (evt_tx, evt_rx) = mpsc::channel::<WorkerEvent>(self.config.queue_capacity);
        let (reset_tx, reset_rx) = watch::channel(0u64);
        let (force_tx, force_rx) = watch::channel(false);

        let registry = Arc::new(self.registry);
        let pool = Arc::new(ProcessPool::new(
            self.config.pool_size,
            launcher,
            reset_rx,
            force_rx,
        ));

        let scheduler = Scheduler::new(
            evt_tx,
            Arc::clone(&pool),
            Arc::clone(&registry),
            self.config.pairing.clone(),
            reset_tx,
            force_tx,
        );
        tokio::spawn(scheduler.run(cmd_rx, evt_rx));

        info!(
            pool_size = self.config.pool_size,
            handlers = registry.len(),
            "hook engine started"
        );
        Ok(HookEngine {
            coordinator: Arc::new(Coordinator::new(cmd_tx, pool, registry, self.config)),
        })
    }
}

/// One step of a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub hook_type: HookType,
    pub outcome: HookOutcome,
}

/// Result of a workflow: the steps that ran, in order, and whether every
/// step succeeded. Workflows stop at the first non-success outcome.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub steps: Vec<WorkflowStep>,
    pub completed: bool,
}

impl WorkflowReport {
    fn record(&mut self, hook_type: HookType, outcome: HookOutcome) -> bool {
        let ok = outcome.is_success();
        self.steps.push(WorkflowStep { hook_type, outcome });
        if !ok {
            self.completed = false;
        }
        ok
    }
}

/// An owned hook coordination engine.
///
/// Cloning is cheap; all clones share the same scheduler and pool.
#[derive(Clone)]
pub struct HookEngine {
    coordinator: Arc<Coordinator>,
}

impl HookEngine {
    pub fn builder() -> HookEngineBuilder {
        HookEngineBuilder::new()
    }

    /// Generic entry point; the typed per-hook methods below delegate here.
    pub async fn call(
        &self,
        hook_type: HookType,
        args: Vec<String>,
        opts: CallOpts,
    ) -> Result<HookOutcome> {
        self.coordinator.coordinate_hook(hook_type, args, opts).await
    }

    pub async fn notify(&self, message: impl Into<String>, opts: CallOpts) -> Result<HookOutcome> {
        self.call(HookType::Notify, vec![message.into()], opts).await
    }

    pub async fn pre_task(&self, task_id: impl Into<String>, opts: CallOpts) -> Result<HookOutcome> {
        self.call(HookType::PreTask, vec![task_id.into()], opts).await
    }

    pub async fn post_task(
        &self,
        task_id: impl Into<String>,
        opts: CallOpts,
    ) -> Result<HookOutcome> {
        self.call(HookType::PostTask, vec![task_id.into()], opts).await
    }

    pub async fn pre_edit(&self, file: impl Into<String>, opts: CallOpts) -> Result<HookOutcome> {
        self.call(HookType::PreEdit, vec![file.into()], opts).await
    }

    pub async fn post_edit(&self, file: impl Into<String>, opts: CallOpts) -> Result<HookOutcome> {
        self.call(HookType::PostEdit, vec![file.into()], opts).await
    }

    pub async fn pre_read(&self, file: impl Into<String>, opts: CallOpts) -> Result<HookOutcome> {
        self.call(HookType::PreRead, vec![file.into()], opts).await
    }

    pub async fn session_start(
        &self,
        session_id: impl Into<String>,
        opts: CallOpts,
    ) -> Result<HookOutcome> {
        self.call(HookType::SessionStart, vec![session_id.into()], opts)
            .await
    }

    pub async fn session_end(
        &self,
        session_id: impl Into<String>,
        opts: CallOpts,
    ) -> Result<HookOutcome> {
        self.call(HookType::SessionEnd, vec![session_id.into()], opts)
            .await
    }

    /// Pre-task then post-task for one task id, stopping if the pre hook
    /// does not succeed.
    pub async fn run_task_workflow(
        &self,
        task_id: impl Into<String>,
        opts: CallOpts,
    ) -> Result<WorkflowReport> {
        let task_id = task_id.into();
        let mut report = WorkflowReport {
            steps: Vec::new(),
            completed: true,
        };
        let outcome = self.pre_task(task_id.clone(), opts).await?;
        if report.record(HookType::PreTask, outcome) {
            let outcome = self.post_task(task_id, opts).await?;
            report.record(HookType::PostTask, outcome);
        }
        Ok(report)
    }

    /// Pre-edit then post-edit for one file, stopping if the pre hook does
    /// not succeed.
    pub async fn run_file_workflow(
        &self,
        file: impl Into<String>,
        opts: CallOpts,
    ) -> Result<WorkflowReport> {
        let file = file.into();
        let mut report = WorkflowReport {
            steps: Vec::new(),
            completed: true,
        };
        let outcome = self.pre_edit(file.clone(), opts).await?;
        if report.record(HookType::PreEdit, outcome) {
            let outcome = self.post_edit(file, opts).await?;
            report.record(HookType::PostEdit, outcome);
        }
        Ok(report)
    }

    /// Session-start then session-end for one session id, stopping if the
    /// start hook does not succeed.
    pub async fn run_session_workflow(
        &self,
        session_id: impl Into<String>,
        opts: CallOpts,
    ) -> Result<WorkflowReport> {
        let session_id = session_id.into();
        let mut report = WorkflowReport {
            steps: Vec::new(),
            completed: true,
        };
        let outcome = self.session_start(session_id.clone(), opts).await?;
        if report.record(HookType::SessionStart, outcome) {
            let outcome = self.session_end(session_id, opts).await?;
            report.record(HookType::SessionEnd, outcome);
        }
        Ok(report)
    }

    /// Snapshot of queue depth, in-flight count, held locks, pool
    /// utilization, and per-hook-type stats. Serializable for diagnostics
    /// output.
    pub async fn status(&self) -> Result<CoordinationStatus> {
        self.coordinator.status().await
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.coordinator.pool_status()
    }

    /// Abort everything in flight and drain the queue. Every outstanding
    /// caller resolves with [`HookOutcome::Reset`].
    pub async fn emergency_reset(&self) -> Result<()> {
        self.coordinator.emergency_reset().await
    }

    /// Stop accepting work, wait up to `grace` for running hooks, then
    /// force-terminate the rest.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.coordinator.shutdown(grace).await
    }
}
