//! Shared test support: an in-process launcher that records execution
//! windows instead of spawning real processes.

use async_trait::async_trait;
use latch::{HookInvocation, HookLauncher, HookType, LaunchStatus, RunResult, SlotHandle};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Route engine logs to the test writer; safe to call from every test.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One recorded launch, with the wall-clock window it occupied.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub hook_type: HookType,
    pub args: Vec<String>,
    pub started: Instant,
    pub finished: Instant,
}

impl Recorded {
    pub fn overlaps(&self, other: &Recorded) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Launcher that sleeps instead of spawning. Args are interpreted as
/// directives: `delay=NNN` sleeps NNN milliseconds, `exit=N` reports exit
/// code N. A delay at or past the invocation timeout reports a timeout, the
/// way the real launcher would after killing the child.
#[derive(Clone, Default)]
pub struct RecordingLauncher {
    log: Arc<Mutex<Vec<Recorded>>>,
    fail_hook: Option<(HookType, i32)>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `exit_code` for every launch of `hook_type`.
    pub fn failing(hook_type: HookType, exit_code: i32) -> Self {
        Self {
            log: Arc::default(),
            fail_hook: Some((hook_type, exit_code)),
        }
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn execution_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn directive(args: &[String], key: &str) -> Option<u64> {
        args.iter()
            .find_map(|a| a.strip_prefix(key))
            .and_then(|v| v.parse().ok())
    }
}

#[async_trait]
impl HookLauncher for RecordingLauncher {
    async fn run(
        &self,
        invocation: &HookInvocation,
        _slot: &SlotHandle,
    ) -> latch::Result<LaunchStatus> {
        let started = Instant::now();
        let delay = Duration::from_millis(
            Self::directive(&invocation.args, "delay=").unwrap_or(5),
        );
        let exit_code = match self.fail_hook {
            Some((hook_type, code)) if hook_type == invocation.hook_type => code,
            _ => Self::directive(&invocation.args, "exit=").unwrap_or(0) as i32,
        };

        let timed_out = delay >= invocation.timeout;
        tokio::time::sleep(delay.min(invocation.timeout)).await;

        self.log.lock().unwrap().push(Recorded {
            hook_type: invocation.hook_type,
            args: invocation.args.clone(),
            started,
            finished: Instant::now(),
        });

        if timed_out {
            return Ok(LaunchStatus::TimedOut);
        }
        Ok(LaunchStatus::Completed(RunResult {
            exit_code,
            stdout: format!("{} done\n", invocation.hook_type),
            stderr: String::new(),
            duration: started.elapsed(),
        }))
    }
}
