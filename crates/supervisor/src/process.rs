//! Real child-process backend for the admission core.
//!
//! Runners inherit the supervisor's stdio. Kills are a plain `SIGTERM` with
//! no graceful wait; the runner's own signal handler publishes bot removals
//! before exiting. Exit notifications flow back through an unbounded channel
//! so the core can schedule restarts.

use anyhow::Context;
use tokio::sync::mpsc;

use crate::{Spawner, SupervisorCfg};

#[derive(Debug)]
pub enum RunnerEvent {
    Exited { hub_sid: String, generation: u64 },
}

pub struct ProcessSpawner {
    runner_bin: String,
    base_url: String,
    events: mpsc::UnboundedSender<RunnerEvent>,
}

pub struct ProcHandle {
    pid: Option<u32>,
}

impl ProcessSpawner {
    #[must_use]
    pub fn new(cfg: &SupervisorCfg, events: mpsc::UnboundedSender<RunnerEvent>) -> Self {
        Self {
            runner_bin: cfg.runner_bin.clone(),
            base_url: cfg.hubs_base_url.clone(),
            events,
        }
    }
}

impl Spawner for ProcessSpawner {
    type Handle = ProcHandle;

    fn spawn(&mut self, hub_sid: &str, generation: u64) -> anyhow::Result<ProcHandle> {
        let mut child = tokio::process::Command::new(&self.runner_bin)
            .args(["--url", &self.base_url, "--room", hub_sid, "--runner"])
            .spawn()
            .with_context(|| format!("spawn {} for {hub_sid}", self.runner_bin))?;
        let pid = child.id();
        log::info!("started runner for {hub_sid} (pid {pid:?})");

        let hub_sid = hub_sid.to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            log::info!("runner for {hub_sid} exited: {status:?}");
            let _ = events.send(RunnerEvent::Exited { hub_sid, generation });
        });
        Ok(ProcHandle { pid })
    }

    fn kill(&mut self, hub_sid: &str, handle: &mut ProcHandle) {
        if let Some(pid) = handle.pid.take() {
            log::info!("stopping runner for {hub_sid} (pid {pid})");
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
}
