//! Worker pool supervision loop.
//!
//! # Responsibilities
//! - Spawn one worker per slot at startup
//! - Observe every worker exit and apply the restart policy
//! - Abandon crash-looping slots and raise an alert
//! - On shutdown: stop respawning, SIGTERM live workers, SIGKILL stragglers
//!
//! Workers never talk to each other or to the supervisor. Each one owns
//! its rate limiter and session store, so those are per process.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::SupervisorConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::supervisor::policy::{RestartDecision, RestartPolicy, RestartTracker};
use crate::supervisor::spawner::WorkerSpawner;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn worker {slot}: {source}")]
    Spawn {
        slot: usize,
        #[source]
        source: io::Error,
    },

    #[error("all {0} worker slots abandoned after crash loops")]
    AllWorkersFailed(usize),
}

/// Snapshot of the pool, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub target: usize,
    pub live: usize,
    pub restarts: u64,
    pub abandoned: usize,
    /// Pid per slot; `None` while the slot is empty.
    pub pids: Vec<Option<u32>>,
}

struct Exit {
    slot: usize,
    pid: Option<u32>,
    status: io::Result<ExitStatus>,
    uptime: Duration,
}

struct Slot {
    pid: Option<u32>,
    tracker: RestartTracker,
}

/// Owns N worker processes and keeps the pool at N.
pub struct Supervisor<S> {
    spawner: Arc<S>,
    size: usize,
    policy: RestartPolicy,
    shutdown_grace: Duration,
    status_tx: watch::Sender<PoolStatus>,
}

impl<S: WorkerSpawner> Supervisor<S> {
    pub fn new(spawner: S, size: usize, config: &SupervisorConfig) -> Self {
        let (status_tx, _) = watch::channel(PoolStatus {
            target: size,
            pids: vec![None; size],
            ..PoolStatus::default()
        });
        Self {
            spawner: Arc::new(spawner),
            size,
            policy: RestartPolicy::from(config),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            status_tx,
        }
    }

    /// Subscribe to pool status updates.
    pub fn status(&self) -> watch::Receiver<PoolStatus> {
        self.status_tx.subscribe()
    }

    /// Run until `shutdown` fires or every slot is abandoned.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), SupervisorError> {
        tracing::info!(workers = self.size, "Forking workers");

        let mut slots: Vec<Slot> = (0..self.size)
            .map(|_| Slot {
                pid: None,
                tracker: RestartTracker::new(&self.policy),
            })
            .collect();
        let mut exits: JoinSet<Exit> = JoinSet::new();
        let mut timers: JoinSet<usize> = JoinSet::new();
        let mut restarts = 0u64;

        for slot in 0..self.size {
            let child = self
                .spawner
                .spawn(slot)
                .map_err(|source| SupervisorError::Spawn { slot, source })?;
            slots[slot].pid = watch_child(&mut exits, slot, child);
        }
        self.publish(&slots, restarts);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                Some(joined) = exits.join_next() => {
                    let exit = match joined {
                        Ok(exit) => exit,
                        Err(e) => {
                            tracing::error!(error = %e, "Worker watcher task failed");
                            continue;
                        }
                    };
                    if shutdown.is_triggered() {
                        slots[exit.slot].pid = None;
                        break;
                    }
                    if self.handle_exit(exit, &mut slots, &mut exits, &mut timers, &mut restarts) {
                        self.publish(&slots, restarts);
                        tracing::error!(
                            workers = self.size,
                            "Every worker slot is in a crash loop; supervisor giving up"
                        );
                        return Err(SupervisorError::AllWorkersFailed(self.size));
                    }
                    self.publish(&slots, restarts);
                }
                Some(Ok(slot)) = timers.join_next() => {
                    if !shutdown.is_triggered() {
                        self.respawn(slot, &mut slots, &mut exits, &mut restarts);
                        self.publish(&slots, restarts);
                    }
                }
            }
        }

        timers.abort_all();
        self.stop_all(&mut slots, exits).await;
        self.publish(&slots, restarts);
        tracing::info!("Supervisor stopped");
        Ok(())
    }

    /// Apply the restart policy to one exit. Returns true once every slot is abandoned.
    fn handle_exit(
        &self,
        exit: Exit,
        slots: &mut [Slot],
        exits: &mut JoinSet<Exit>,
        timers: &mut JoinSet<usize>,
        restarts: &mut u64,
    ) -> bool {
        let Exit {
            slot,
            pid,
            status,
            uptime,
        } = exit;
        slots[slot].pid = None;

        match &status {
            Ok(status) => {
                tracing::warn!(slot, pid = ?pid, status = %status, uptime = ?uptime, "Worker died")
            }
            Err(e) => tracing::warn!(
                slot,
                pid = ?pid,
                error = %e,
                "Worker failed to start or could not be awaited"
            ),
        }

        match slots[slot]
            .tracker
            .on_exit(&self.policy, uptime, Instant::now())
        {
            RestartDecision::Restart { delay, attempt } if delay.is_zero() => {
                tracing::info!(slot, attempt, "Restarting worker");
                self.respawn(slot, slots, exits, restarts);
                false
            }
            RestartDecision::Restart { delay, attempt } => {
                tracing::info!(slot, attempt, delay = ?delay, "Restarting worker after backoff");
                timers.spawn(async move {
                    tokio::time::sleep(delay).await;
                    slot
                });
                false
            }
            RestartDecision::GiveUp { recent_exits } => {
                tracing::error!(
                    alert = true,
                    slot,
                    recent_exits,
                    window = ?self.policy.window,
                    "Worker crash loop detected; slot abandoned"
                );
                metrics::record_crash_loop(slot);
                slots.iter().all(|s| s.tracker.is_abandoned())
            }
        }
    }

    fn respawn(
        &self,
        slot: usize,
        slots: &mut [Slot],
        exits: &mut JoinSet<Exit>,
        restarts: &mut u64,
    ) {
        *restarts += 1;
        metrics::record_worker_restart(slot);
        match self.spawner.spawn(slot) {
            Ok(child) => {
                slots[slot].pid = watch_child(exits, slot, child);
                tracing::info!(slot, pid = ?slots[slot].pid, "Worker started");
            }
            Err(e) => {
                // Counts as an instant exit so the restart policy sees it.
                exits.spawn(async move {
                    Exit {
                        slot,
                        pid: None,
                        status: Err(e),
                        uptime: Duration::ZERO,
                    }
                });
            }
        }
    }

    async fn stop_all(&self, slots: &mut [Slot], mut exits: JoinSet<Exit>) {
        let live: Vec<u32> = slots.iter().filter_map(|s| s.pid).collect();
        tracing::info!(live = live.len(), "Stopping workers");
        for pid in &live {
            signal_worker(*pid, false);
        }

        let drain = async {
            while let Some(joined) = exits.join_next().await {
                if let Ok(exit) = joined {
                    slots[exit.slot].pid = None;
                    if let Ok(status) = exit.status {
                        tracing::info!(
                            slot = exit.slot,
                            pid = ?exit.pid,
                            status = %status,
                            "Worker exited"
                        );
                    }
                }
            }
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            let stragglers: Vec<u32> = slots.iter().filter_map(|s| s.pid).collect();
            tracing::warn!(count = stragglers.len(), "Workers did not drain in time; killing");
            for pid in stragglers {
                signal_worker(pid, true);
            }
            exits.abort_all();
            while exits.join_next().await.is_some() {}
            for slot in slots.iter_mut() {
                slot.pid = None;
            }
        }
    }

    fn publish(&self, slots: &[Slot], restarts: u64) {
        let pids: Vec<Option<u32>> = slots.iter().map(|s| s.pid).collect();
        let live = pids.iter().flatten().count();
        metrics::record_live_workers(live);
        self.status_tx.send_replace(PoolStatus {
            target: self.size,
            live,
            restarts,
            abandoned: slots.iter().filter(|s| s.tracker.is_abandoned()).count(),
            pids,
        });
    }
}

/// Move `child` into a task that reports its exit. Returns the pid.
fn watch_child(exits: &mut JoinSet<Exit>, slot: usize, mut child: Child) -> Option<u32> {
    let pid = child.id();
    let started = Instant::now();
    exits.spawn(async move {
        let status = child.wait().await;
        Exit {
            slot,
            pid,
            status,
            uptime: started.elapsed(),
        }
    });
    pid
}

#[cfg(unix)]
fn signal_worker(pid: u32, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, signal = ?signal, "Failed to signal worker"),
    }
}

#[cfg(not(unix))]
fn signal_worker(_pid: u32, _force: bool) {
    // Children are spawned with kill_on_drop; aborting their watcher kills them.
}
