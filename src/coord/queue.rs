//! Execution queue and scheduler.
//!
//! All admission state (priority heap, lock table, dependency graph, stampede
//! map, stats) is owned by a single scheduler task and mutated only there.
//! Hook processes run in parallel inside the pool; only the bookkeeping is
//! serialized.
//!
//! Callers talk to the scheduler over a command channel; dispatched workers
//! report back over an event channel. A caller's oneshot reply is the only
//! suspension point exposed outside the engine.

use crate::coord::graph::DependencyGraph;
use crate::coord::locks::LockTable;
use crate::coord::pool::{HookInvocation, ProcessPool};
use crate::coord::registry::HookRegistry;
use crate::coord::types::{
    CoordinationStatus, ExecutionStats, Fingerprint, HookOutcome, HookRequest, HookSpec,
    HookType, RejectReason, RequestId, RequestStatus,
};
use crate::core::config::{PairScope, PairingRules};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Commands accepted by the scheduler task.
pub(crate) enum SchedulerCommand {
    Enqueue {
        spec: HookSpec,
        reply: oneshot::Sender<HookOutcome>,
    },
    Status {
        reply: oneshot::Sender<CoordinationStatus>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        grace: Duration,
        reply: oneshot::Sender<()>,
    },
}

/// Terminal report from a dispatched worker.
pub(crate) struct WorkerEvent {
    pub id: RequestId,
    pub outcome: HookOutcome,
}

/// Heap key: priority rank first, insertion sequence for FIFO tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    rank: u8,
    seq: RequestId,
}

struct PendingRequest {
    request: HookRequest,
    waiters: Vec<oneshot::Sender<HookOutcome>>,
    fingerprint: Fingerprint,
}

pub(crate) struct Scheduler {
    evt_tx: mpsc::Sender<WorkerEvent>,
    pool: Arc<ProcessPool>,
    registry: Arc<HookRegistry>,
    rules: PairingRules,

    heap: BinaryHeap<Reverse<HeapEntry>>,
    pending: HashMap<RequestId, PendingRequest>,
    in_flight: HashSet<RequestId>,
    locks: LockTable,
    graph: DependencyGraph,
    stampede: HashMap<Fingerprint, RequestId>,
    stats: BTreeMap<HookType, ExecutionStats>,
    next_id: RequestId,
    closed: bool,

    reset_tx: watch::Sender<u64>,
    force_tx: watch::Sender<bool>,
    shutdown_deadline: Option<tokio::time::Instant>,
    shutdown_reply: Option<oneshot::Sender<()>>,
    forced: bool,
}

impl Scheduler {
    pub(crate) fn new(
        evt_tx: mpsc::Sender<WorkerEvent>,
        pool: Arc<ProcessPool>,
        registry: Arc<HookRegistry>,
        rules: PairingRules,
        reset_tx: watch::Sender<u64>,
        force_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            evt_tx,
            pool,
            registry,
            rules,
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            in_flight: HashSet::new(),
            locks: LockTable::new(),
            graph: DependencyGraph::new(),
            stampede: HashMap::new(),
            stats: BTreeMap::new(),
            next_id: 1,
            closed: false,
            reset_tx,
            force_tx,
            shutdown_deadline: None,
            shutdown_reply: None,
            forced: false,
        }
    }

    /// Scheduler main loop. Exits once the command channel is closed (the
    /// engine was dropped) and no work remains in flight.
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SchedulerCommand>,
        mut evt_rx: mpsc::Receiver<WorkerEvent>,
    ) {
        let mut cmd_open = true;
        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv(), if cmd_open => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => cmd_open = false,
                },
                Some(event) = evt_rx.recv() => {
                    self.handle_finished(event.id, event.outcome);
                }
                _ = tokio::time::sleep_until(
                    self.shutdown_deadline.unwrap_or_else(tokio::time::Instant::now)
                ), if self.shutdown_deadline.is_some() && !self.forced => {
                    info!("shutdown grace expired, force-terminating remaining hooks");
                    self.forced = true;
                    let _ = self.force_tx.send(true);
                }
            }

            if self.shutdown_reply.is_some() && self.in_flight.is_empty() {
                if let Some(reply) = self.shutdown_reply.take() {
                    let _ = reply.send(());
                }
                self.shutdown_deadline = None;
                info!("shutdown complete");
            }

            if !cmd_open && self.in_flight.is_empty() {
                if !self.pending.is_empty() {
                    debug!(
                        abandoned = self.pending.len(),
                        "engine dropped with queued requests, resolving as reset"
                    );
                    for (_, pending) in self.pending.drain() {
                        for waiter in pending.waiters {
                            let _ = waiter.send(HookOutcome::Reset);
                        }
                    }
                }
                break;
            }
        }
        debug!("scheduler task exiting");
    }

    fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Enqueue { spec, reply } => {
                self.admit(spec, reply);
                self.pump();
            }
            SchedulerCommand::Status { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SchedulerCommand::Reset { reply } => {
                self.emergency_reset();
                let _ = reply.send(());
            }
            SchedulerCommand::Shutdown { grace, reply } => {
                self.begin_shutdown(grace, reply);
            }
        }
    }

    /// Admission: stampede dedup, pairing-edge derivation, atomic cycle
    /// check, heap insertion. Rejection mutates nothing.
    fn admit(&mut self, spec: HookSpec, reply: oneshot::Sender<HookOutcome>) {
        if self.closed {
            self.record(spec.hook_type, &HookOutcome::Rejected(RejectReason::ShuttingDown));
            let _ = reply.send(HookOutcome::Rejected(RejectReason::ShuttingDown));
            return;
        }

        let fingerprint = Fingerprint::compute(spec.hook_type, &spec.args);
        if let Some(&existing) = self.stampede.get(&fingerprint) {
            if let Some(pending) = self.pending.get_mut(&existing) {
                debug!(
                    request = existing,
                    hook = %spec.hook_type,
                    "coalescing duplicate in-flight hook request"
                );
                pending.waiters.push(reply);
                return;
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let request = HookRequest::from_spec(id, spec);

        let edges = self.pairing_edges(&request);
        if !self.graph.try_admit(id, &edges) {
            debug!(
                request = id,
                hook = %request.hook_type,
                "admission would close a dependency cycle, rejecting"
            );
            self.record(
                request.hook_type,
                &HookOutcome::Rejected(RejectReason::CircularDependency),
            );
            let _ = reply.send(HookOutcome::Rejected(RejectReason::CircularDependency));
            return;
        }

        debug!(
            request = id,
            hook = %request.hook_type,
            priority = ?request.priority,
            keys = request.resource_keys.len(),
            edges = edges.len(),
            "hook request admitted"
        );
        self.heap.push(Reverse(HeapEntry {
            rank: request.priority.rank(),
            seq: id,
        }));
        let successors: Vec<RequestId> = edges
            .iter()
            .filter(|&&(from, _)| from == id)
            .map(|&(_, to)| to)
            .collect();
        self.locks.register(&request.resource_keys, id, &successors);
        self.stampede.insert(fingerprint, id);
        self.pending.insert(
            id,
            PendingRequest {
                request,
                waiters: vec![reply],
                fingerprint,
            },
        );
    }

    /// Derive must-complete-before edges between the incoming request and
    /// live requests, applying the rule table in both roles. Edges toward an
    /// existing request are only meaningful while it is still queued.
    fn pairing_edges(&self, request: &HookRequest) -> Vec<(RequestId, RequestId)> {
        let mut edges = Vec::new();
        for rule in self.rules.iter() {
            for (&other_id, other) in &self.pending {
                let existing = &other.request;
                let scope_ok = |pred: &HookRequest, succ: &HookRequest| match rule.scope {
                    PairScope::Any => true,
                    PairScope::SharedKey => pred
                        .resource_keys
                        .iter()
                        .any(|k| succ.resource_keys.contains(k)),
                };
                if rule.successor == request.hook_type
                    && rule.predecessor == existing.hook_type
                    && scope_ok(existing, request)
                {
                    edges.push((other_id, request.id));
                }
                if rule.predecessor == request.hook_type
                    && rule.successor == existing.hook_type
                    && existing.status == RequestStatus::Queued
                    && scope_ok(request, existing)
                {
                    edges.push((request.id, other_id));
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Dispatch loop: walk the heap in (priority, FIFO) order, skip
    /// candidates whose dependencies are unfinished or whose turn on a
    /// resource has not come, dispatch the rest until the pool is full.
    /// Skipped entries keep their position.
    fn pump(&mut self) {
        if self.closed {
            return;
        }
        let capacity = self.pool.size();
        let mut skipped: Vec<HeapEntry> = Vec::new();

        while self.in_flight.len() < capacity {
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let id = entry.seq;
            let Some(pending) = self.pending.get(&id) else {
                // Entry outlived its request (coalesced terminal), drop it.
                continue;
            };
            if pending.request.status != RequestStatus::Queued {
                continue;
            }
            if !self.graph.is_ready(id) {
                skipped.push(entry);
                continue;
            }
            if !self
                .locks
                .try_acquire_all(&pending.request.resource_keys, id)
            {
                skipped.push(entry);
                continue;
            }
            self.dispatch(id);
        }

        for entry in skipped {
            self.heap.push(Reverse(entry));
        }
    }

    fn dispatch(&mut self, id: RequestId) {
        let Some(pending) = self.pending.get_mut(&id) else {
            return;
        };
        pending.request.status = RequestStatus::Locked;

        let Some(handler) = self.registry.get(pending.request.hook_type) else {
            // The coordinator validates registration up front; losing the
            // race here still must release the acquired locks.
            warn!(request = id, "handler vanished between admission and dispatch");
            self.finalize(id, HookOutcome::Rejected(RejectReason::UnregisteredHook));
            return;
        };

        let invocation = HookInvocation {
            request_id: id,
            hook_type: pending.request.hook_type,
            program: handler.program.clone(),
            args: handler
                .base_args
                .iter()
                .chain(pending.request.args.iter())
                .cloned()
                .collect(),
            timeout: pending.request.timeout,
        };
        pending.request.status = RequestStatus::Running;
        self.in_flight.insert(id);
        info!(
            request = id,
            hook = %invocation.hook_type,
            program = %invocation.program.display(),
            "dispatching hook"
        );

        let pool = self.pool.clone();
        let evt_tx = self.evt_tx.clone();
        tokio::spawn(async move {
            let outcome = pool.dispatch(invocation).await;
            let _ = evt_tx.send(WorkerEvent { id, outcome }).await;
        });
    }

    /// Retire a terminal request, then try to dispatch unblocked work.
    fn handle_finished(&mut self, id: RequestId, outcome: HookOutcome) {
        self.finalize(id, outcome);
        self.pump();
    }

    /// Free a terminal request's locks and edges and resolve every waiter
    /// with the shared outcome. Does not pump; callers decide when.
    fn finalize(&mut self, id: RequestId, outcome: HookOutcome) {
        let Some(mut pending) = self.pending.remove(&id) else {
            // Worker outlived a reset; its bookkeeping is already gone.
            debug!(request = id, "ignoring report for retired request");
            return;
        };
        self.in_flight.remove(&id);
        self.locks.release_all(id);
        self.locks.forget(id);
        self.graph.remove(id);
        if self.stampede.get(&pending.fingerprint) == Some(&id) {
            self.stampede.remove(&pending.fingerprint);
        }

        pending.request.status = outcome.status();
        self.record(pending.request.hook_type, &outcome);
        debug!(
            request = id,
            hook = %pending.request.hook_type,
            waiters = pending.waiters.len(),
            outcome = ?pending.request.status,
            "hook request finished"
        );
        for waiter in pending.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Circuit breaker: fail everything outstanding with `Reset`, clear all
    /// admission state, and signal in-flight workers to kill their processes.
    fn emergency_reset(&mut self) {
        warn!(
            queued = self.pending.len() - self.in_flight.len(),
            in_flight = self.in_flight.len(),
            "emergency reset"
        );
        self.reset_tx.send_modify(|generation| *generation += 1);
        self.heap.clear();
        let drained: Vec<(RequestId, PendingRequest)> = self.pending.drain().collect();
        for (_, mut pending) in drained {
            pending.request.status = RequestStatus::Reset;
            self.record(pending.request.hook_type, &HookOutcome::Reset);
            for waiter in pending.waiters {
                let _ = waiter.send(HookOutcome::Reset);
            }
        }
        self.in_flight.clear();
        self.locks.clear();
        self.graph.clear();
        self.stampede.clear();
    }

    /// Close admission, reject everything still queued, and give in-flight
    /// work `grace` to drain before the force signal fires.
    fn begin_shutdown(&mut self, grace: Duration, reply: oneshot::Sender<()>) {
        info!(grace_ms = grace.as_millis() as u64, "shutdown requested");
        self.closed = true;
        self.heap.clear();

        let queued: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.request.status == RequestStatus::Queued)
            .map(|(&id, _)| id)
            .collect();
        for id in queued {
            if let Some(pending) = self.pending.remove(&id) {
                self.locks.forget(id);
                self.graph.remove(id);
                if self.stampede.get(&pending.fingerprint) == Some(&id) {
                    self.stampede.remove(&pending.fingerprint);
                }
                self.record(
                    pending.request.hook_type,
                    &HookOutcome::Rejected(RejectReason::ShuttingDown),
                );
                for waiter in pending.waiters {
                    let _ = waiter.send(HookOutcome::Rejected(RejectReason::ShuttingDown));
                }
            }
        }

        if self.in_flight.is_empty() {
            let _ = reply.send(());
            return;
        }
        self.shutdown_deadline = Some(tokio::time::Instant::now() + grace);
        self.shutdown_reply = Some(reply);
    }

    fn record(&mut self, hook_type: HookType, outcome: &HookOutcome) {
        self.stats.entry(hook_type).or_default().record(outcome);
    }

    fn snapshot(&self) -> CoordinationStatus {
        CoordinationStatus {
            queue_depth: self
                .pending
                .values()
                .filter(|p| p.request.status == RequestStatus::Queued)
                .count(),
            in_flight: self.in_flight.len(),
            locks: self.locks.snapshot(),
            pool: self.pool.status(),
            stats: self
                .stats
                .iter()
                .map(|(hook_type, stats)| (hook_type.as_str().to_string(), stats.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::pool::{HookLauncher, LaunchStatus, RunResult, SlotHandle};
    use crate::coord::types::Priority;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-process launcher that records invocation order. Args of the form
    /// `delay=NNN` sleep that many milliseconds; `exit=N` sets the code.
    struct FakeLauncher {
        calls: Mutex<Vec<(HookType, Vec<String>)>>,
    }

    impl FakeLauncher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(HookType, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HookLauncher for FakeLauncher {
        async fn run(
            &self,
            invocation: &crate::coord::pool::HookInvocation,
            _slot: &SlotHandle,
        ) -> crate::core::errors::Result<LaunchStatus> {
            self.calls
                .lock()
                .unwrap()
                .push((invocation.hook_type, invocation.args.clone()));
            let mut delay = Duration::from_millis(10);
            let mut exit_code = 0;
            for arg in &invocation.args {
                if let Some(ms) = arg.strip_prefix("delay=") {
                    delay = Duration::from_millis(ms.parse().unwrap_or(10));
                }
                if let Some(code) = arg.strip_prefix("exit=") {
                    exit_code = code.parse().unwrap_or(0);
                }
            }
            if delay >= invocation.timeout {
                tokio::time::sleep(invocation.timeout).await;
                return Ok(LaunchStatus::TimedOut);
            }
            tokio::time::sleep(delay).await;
            Ok(LaunchStatus::Completed(RunResult {
                exit_code,
                stdout: String::new(),
                stderr: String::new(),
                duration: delay,
            }))
        }
    }

    fn sargs(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    struct Harness {
        cmd_tx: mpsc::Sender<SchedulerCommand>,
        launcher: Arc<FakeLauncher>,
    }

    impl Harness {
        fn new(pool_size: usize, rules: PairingRules) -> Self {
            let launcher = FakeLauncher::new();
            let (cmd_tx, cmd_rx) = mpsc::channel(64);
            let (evt_tx, evt_rx) = mpsc::channel(64);
            let (reset_tx, reset_rx) = watch::channel(0u64);
            let (force_tx, force_rx) = watch::channel(false);
            let pool = Arc::new(ProcessPool::new(
                pool_size,
                launcher.clone(),
                reset_rx,
                force_rx,
            ));
            let mut registry = HookRegistry::new();
            for hook_type in HookType::all() {
                registry.register(hook_type, "fake", Vec::new());
            }
            let scheduler = Scheduler::new(
                evt_tx,
                pool,
                Arc::new(registry),
                rules,
                reset_tx,
                force_tx,
            );
            tokio::spawn(scheduler.run(cmd_rx, evt_rx));
            Self { cmd_tx, launcher }
        }

        async fn enqueue(
            &self,
            hook_type: HookType,
            args: Vec<String>,
            priority: Priority,
        ) -> oneshot::Receiver<HookOutcome> {
            let keys = crate::coord::coordinator::derive_resource_keys(hook_type, &args);
            let (reply_tx, reply_rx) = oneshot::channel();
            self.cmd_tx
                .send(SchedulerCommand::Enqueue {
                    spec: HookSpec {
                        hook_type,
                        args,
                        priority,
                        resource_keys: keys,
                        timeout: Duration::from_secs(5),
                    },
                    reply: reply_tx,
                })
                .await
                .unwrap();
            reply_rx
        }

        async fn status(&self) -> CoordinationStatus {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.cmd_tx
                .send(SchedulerCommand::Status { reply: reply_tx })
                .await
                .unwrap();
            reply_rx.await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_single_request_succeeds() {
        let harness = Harness::new(2, PairingRules::default());
        let rx = harness
            .enqueue(HookType::Notify, sargs(&["hello"]), Priority::Medium)
            .await;
        assert!(rx.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_priority_order_with_single_slot() {
        let harness = Harness::new(1, PairingRules::none());
        // Occupy the only slot so the next three stay queued together.
        let blocker = harness
            .enqueue(HookType::Notify, sargs(&["blocker", "delay=100"]), Priority::High)
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let low = harness
            .enqueue(HookType::Notify, sargs(&["low"]), Priority::Low)
            .await;
        let high = harness
            .enqueue(HookType::Notify, sargs(&["high"]), Priority::High)
            .await;
        let medium = harness
            .enqueue(HookType::Notify, sargs(&["medium"]), Priority::Medium)
            .await;

        for rx in [blocker, low, high, medium] {
            assert!(rx.await.unwrap().is_success());
        }

        let order: Vec<String> = harness
            .launcher
            .calls()
            .iter()
            .skip(1)
            .map(|(_, args)| args[0].clone())
            .collect();
        assert_eq!(order, vec!["high", "medium", "low"]);
    }

    #[tokio::test]
    async fn test_same_resource_serialized_fifo() {
        let harness = Harness::new(4, PairingRules::none());
        let first = harness
            .enqueue(HookType::PreEdit, sargs(&["main.rs", "delay=60"]), Priority::Medium)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = harness
            .enqueue(HookType::PreEdit, sargs(&["main.rs", "delay=60", "x"]), Priority::High)
            .await;

        // Both target the same file; the second must wait despite priority
        // and despite three idle slots.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = harness.status().await;
        assert_eq!(status.in_flight, 1);
        assert_eq!(status.queue_depth, 1);

        assert!(first.await.unwrap().is_success());
        assert!(second.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_same_resource_fifo_beats_priority() {
        let harness = Harness::new(1, PairingRules::none());
        // Occupy the slot so both same-file requests queue up together.
        let blocker = harness
            .enqueue(HookType::Notify, sargs(&["blocker", "delay=80"]), Priority::High)
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = harness
            .enqueue(HookType::PostEdit, sargs(&["shared.rs", "delay=20"]), Priority::Low)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = harness
            .enqueue(HookType::PostEdit, sargs(&["shared.rs", "delay=10"]), Priority::High)
            .await;

        assert!(blocker.await.unwrap().is_success());
        assert!(first.await.unwrap().is_success());
        assert!(second.await.unwrap().is_success());

        // Admission order wins on a shared resource, not priority.
        let order: Vec<String> = harness
            .launcher
            .calls()
            .iter()
            .skip(1)
            .map(|(_, args)| args[1].clone())
            .collect();
        assert_eq!(order, vec!["delay=20", "delay=10"]);
    }

    #[tokio::test]
    async fn test_stampede_dedup_single_execution() {
        let harness = Harness::new(4, PairingRules::default());
        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(
                harness
                    .enqueue(HookType::PreTask, sargs(&["X", "delay=80"]), Priority::Medium)
                    .await,
            );
        }
        let mut outcomes = Vec::new();
        for rx in receivers {
            outcomes.push(rx.await.unwrap());
        }
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(harness.launcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_pairing_edge_orders_pre_before_post() {
        let harness = Harness::new(4, PairingRules::default());
        let pre = harness
            .enqueue(HookType::PreEdit, sargs(&["lib.rs", "delay=80"]), Priority::Low)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let post = harness
            .enqueue(HookType::PostEdit, sargs(&["lib.rs"]), Priority::High)
            .await;

        assert!(pre.await.unwrap().is_success());
        assert!(post.await.unwrap().is_success());
        let calls = harness.launcher.calls();
        assert_eq!(calls[0].0, HookType::PreEdit);
        assert_eq!(calls[1].0, HookType::PostEdit);
    }

    #[tokio::test]
    async fn test_pairing_overrides_wait_list_when_post_admitted_first() {
        let harness = Harness::new(1, PairingRules::default());
        let blocker = harness
            .enqueue(HookType::Notify, sargs(&["blocker", "delay=80"]), Priority::High)
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Post-edit joins the file's wait list first; the pre-edit of the
        // same file must still run ahead of it, not deadlock against it.
        let post = harness
            .enqueue(HookType::PostEdit, sargs(&["main.rs"]), Priority::High)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let pre = harness
            .enqueue(HookType::PreEdit, sargs(&["main.rs"]), Priority::Low)
            .await;

        assert!(blocker.await.unwrap().is_success());
        assert!(post.await.unwrap().is_success());
        assert!(pre.await.unwrap().is_success());

        let order: Vec<HookType> = harness
            .launcher
            .calls()
            .iter()
            .skip(1)
            .map(|(hook_type, _)| *hook_type)
            .collect();
        assert_eq!(order, vec![HookType::PreEdit, HookType::PostEdit]);
    }

    #[tokio::test]
    async fn test_cycle_rejected_without_side_effects() {
        // A rule table that is cyclic between two hook types: admitting the
        // second request produces edges in both directions at once.
        let rules = PairingRules::none()
            .with_rule(crate::core::config::PairingRule::new(
                HookType::Notify,
                HookType::PreRead,
                PairScope::Any,
            ))
            .with_rule(crate::core::config::PairingRule::new(
                HookType::PreRead,
                HookType::Notify,
                PairScope::Any,
            ));
        let harness = Harness::new(1, rules);

        // Occupy the slot so both stay queued.
        let blocker = harness
            .enqueue(HookType::PreEdit, sargs(&["block.rs", "delay=120"]), Priority::High)
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let notify = harness
            .enqueue(HookType::Notify, sargs(&["n"]), Priority::Medium)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = harness.status().await;

        let cyclic = harness
            .enqueue(HookType::PreRead, sargs(&["r"]), Priority::Medium)
            .await;
        assert_eq!(
            cyclic.await.unwrap(),
            HookOutcome::Rejected(RejectReason::CircularDependency)
        );

        let after = harness.status().await;
        assert_eq!(after.queue_depth, before.queue_depth);
        assert_eq!(after.in_flight, before.in_flight);
        assert_eq!(after.locks, before.locks);

        assert!(blocker.await.unwrap().is_success());
        assert!(notify.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_emergency_reset_clears_everything() {
        let harness = Harness::new(2, PairingRules::none());
        let mut receivers = Vec::new();
        for i in 0..12 {
            receivers.push(
                harness
                    .enqueue(HookType::PreEdit, vec![format!("f{i}.rs"), "delay=4000".to_string()], Priority::Medium)
                    .await,
            );
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let before = harness.status().await;
        assert_eq!(before.in_flight, 2);
        assert_eq!(before.queue_depth, 10);

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .cmd_tx
            .send(SchedulerCommand::Reset { reply: reply_tx })
            .await
            .unwrap();
        reply_rx.await.unwrap();

        for rx in receivers {
            assert_eq!(rx.await.unwrap(), HookOutcome::Reset);
        }
        let after = harness.status().await;
        assert_eq!(after.queue_depth, 0);
        assert_eq!(after.in_flight, 0);
        assert!(after.locks.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_and_drains() {
        let harness = Harness::new(1, PairingRules::none());
        let running = harness
            .enqueue(HookType::Notify, sargs(&["run", "delay=60"]), Priority::Medium)
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let queued = harness
            .enqueue(HookType::Notify, sargs(&["wait"]), Priority::Medium)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (reply_tx, reply_rx) = oneshot::channel();
        harness
            .cmd_tx
            .send(SchedulerCommand::Shutdown {
                grace: Duration::from_secs(2),
                reply: reply_tx,
            })
            .await
            .unwrap();

        assert_eq!(
            queued.await.unwrap(),
            HookOutcome::Rejected(RejectReason::ShuttingDown)
        );
        assert!(running.await.unwrap().is_success());
        reply_rx.await.unwrap();

        // Admission is closed for good.
        let late = harness
            .enqueue(HookType::Notify, sargs(&["late"]), Priority::Medium)
            .await;
        assert_eq!(
            late.await.unwrap(),
            HookOutcome::Rejected(RejectReason::ShuttingDown)
        );
    }

    #[tokio::test]
    async fn test_no_starvation_on_disjoint_resources() {
        let harness = Harness::new(1, PairingRules::none());
        let mut receivers = Vec::new();
        for i in 0..15 {
            receivers.push(
                harness
                    .enqueue(HookType::PreEdit, vec![format!("s{i}.rs"), "delay=5".to_string()], Priority::Medium)
                    .await,
            );
        }
        let all = async {
            for rx in receivers {
                assert!(rx.await.unwrap().is_success());
            }
        };
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("requests starved");
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let harness = Harness::new(2, PairingRules::none());
        let ok = harness
            .enqueue(HookType::Notify, sargs(&["a"]), Priority::Medium)
            .await;
        let bad = harness
            .enqueue(HookType::Notify, sargs(&["b", "exit=2"]), Priority::Medium)
            .await;
        assert!(ok.await.unwrap().is_success());
        assert_eq!(
            bad.await.unwrap(),
            HookOutcome::Failed(crate::coord::types::FailureKind::NonZeroExit(2))
        );

        let status = harness.status().await;
        let stats = status.stats.get("notify").unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
    }
}
