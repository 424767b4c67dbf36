// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ErrorKind;
use crate::fork::{self, ProcessSpec, StdIoConf};
use crate::procs::backoff::{BackoffPolicy, RestartBackoff};
use crate::procs::LifecycleState;
use crate::Error;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub backoff: BackoffPolicy,
    /// How long a process has to exit after SIGTERM before it is killed
    pub grace_period: Duration,
    /// Consecutive crashes tolerated before giving up, `None` restarts forever
    pub max_restarts: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            grace_period: Duration::from_secs(5),
            max_restarts: None,
        }
    }
}

struct Inner {
    state: LifecycleState,
    pid: Option<u32>,
}

/// State shared between the supervisor handle and its monitor task
struct Shared {
    name: String,
    inner: Mutex<Inner>,
    events: broadcast::Sender<LifecycleState>,
}

impl Shared {
    fn transition(&self, next: LifecycleState) -> bool {
        self.transition_with(next, None)
    }

    /// Moves to `next`; the pid is only kept while `Running`
    fn transition_with(&self, next: LifecycleState, pid: Option<u32>) -> bool {
        let mut inner = self.inner.lock();
        let current = inner.state;

        if !current.can_transition_to(next) {
            warn!(name = %self.name, from = %current, to = %next, "ignoring invalid state transition");
            return false;
        }

        debug!(name = %self.name, from = %current, to = %next, "state transition");
        inner.state = next;
        inner.pid = if next == LifecycleState::Running { pid } else { None };

        // sent under the lock so subscribers see transitions in order, no subscribers is fine
        self.events.send(next).ok();
        true
    }
}

/// Launch and monitor a process
///
/// Rules:
///   - at most one instance of the process runs at any time
///   - restart the process when it exits, with backoff, until stopped
///   - a stop is honored at every step: before spawning, during backoff, while running
///   - stopping sends SIGTERM, then SIGKILL after the grace period, and always reaps the process
pub struct Supervisor {
    spec: ProcessSpec,
    config: SupervisorConfig,
    shared: Arc<Shared>,
    stop: CancellationToken,
    monitor: AsyncMutex<Option<JoinHandle<Result<(), Error>>>>,
}

impl Supervisor {
    pub fn new(spec: ProcessSpec, config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                name: spec.name.clone(),
                inner: Mutex::new(Inner {
                    state: LifecycleState::Idle,
                    pid: None,
                }),
                events,
            }),
            spec,
            config,
            stop: CancellationToken::new(),
            monitor: AsyncMutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.inner.lock().state
    }

    /// Pid of the process, only present while it is running
    pub fn pid(&self) -> Option<u32> {
        self.shared.inner.lock().pid
    }

    /// Every state entered from now on, in order
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleState> {
        self.shared.events.subscribe()
    }

    /// Launches the process and hands it to a background monitor.
    ///
    /// Returns once the first spawn has been attempted. A missing or non-executable binary fails
    ///   here, a failed spawn is retried by the monitor with backoff.
    pub async fn start(&self) -> Result<(), Error> {
        let mut monitor = self.monitor.lock().await;

        let state = self.state();
        if state != LifecycleState::Idle {
            return Err(Error::invalid_state(self.name(), state));
        }

        if self.stop.is_cancelled() {
            self.shared.transition(LifecycleState::Stopped);
            return Err(Error::invalid_state(self.name(), LifecycleState::Stopped));
        }

        self.shared.transition(LifecycleState::Starting);

        if let Err(e) = fork::check_binary(&self.spec) {
            error!(name = %self.name(), "failed to start: {}", e);
            self.shared.transition(LifecycleState::Stopped);
            return Err(e);
        }

        let child = match fork::new_process(&self.spec, StdIoConf::default()) {
            Ok(child) => {
                self.shared
                    .transition_with(LifecycleState::Running, child.id());
                Some(child)
            }
            Err(e) => {
                warn!(name = %self.name(), "launch failed, retrying: {}", e);
                self.shared.transition(LifecycleState::Crashed);
                None
            }
        };

        let task = Monitor {
            spec: self.spec.clone(),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            stop: self.stop.clone(),
        };

        *monitor = Some(tokio::spawn(task.run(child)));
        Ok(())
    }

    /// Stops the process and waits for the monitor to finish.
    ///
    /// Safe to call any number of times, before or after `start`.
    pub async fn stop(&self) -> Result<(), Error> {
        // cancel before taking the lock, a pending backoff wait ends right away
        self.stop.cancel();

        let mut monitor = self.monitor.lock().await;
        let result = match monitor.take() {
            Some(task) => task
                .await
                .map_err(|e| Error::from(format!("{} monitor failed: {}", self.name(), e)))?,
            None => Ok(()),
        };

        if self.state() == LifecycleState::Idle {
            self.shared.transition(LifecycleState::Stopped);
        }

        result
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // the monitor terminates its process once it sees this
        self.stop.cancel();
    }
}

struct Monitor {
    spec: ProcessSpec,
    config: SupervisorConfig,
    shared: Arc<Shared>,
    stop: CancellationToken,
}

impl Monitor {
    /// Supervises `child`, or starts with a restart when the first spawn failed
    async fn run(self, first: Option<Child>) -> Result<(), Error> {
        let mut backoff = RestartBackoff::new(self.config.backoff);

        let mut child = match first {
            Some(child) => child,
            None => match self.restart(&mut backoff, Duration::ZERO).await {
                Some(child) => child,
                None => return Ok(()),
            },
        };

        loop {
            let started = Instant::now();
            let pid = child.id();

            let uptime = tokio::select! {
                status = child.wait() => {
                    let uptime = started.elapsed();
                    match status {
                        Ok(status) => warn!(name = %self.spec.name, %status, ?uptime, "process exited unexpectedly"),
                        Err(e) => error!(name = %self.spec.name, ?uptime, "failed waiting on process: {}", e),
                    }
                    uptime
                }
                _ = self.stop.cancelled() => {
                    self.shared.transition(LifecycleState::Stopping);
                    let result = terminate(&self.spec.name, &mut child, self.config.grace_period).await;
                    self.shared.transition(LifecycleState::Stopped);
                    return result;
                }
            };

            // the next instance must not run next to what the crashed one left behind
            if let Some(pid) = pid {
                signal_group(&self.spec.name, pid, Signal::SIGKILL);
            }

            self.shared.transition(LifecycleState::Crashed);

            child = match self.restart(&mut backoff, uptime).await {
                Some(child) => child,
                None => return Ok(()),
            };
        }
    }

    /// Waits out the backoff and spawns a new instance, `None` once the supervisor is done
    async fn restart(&self, backoff: &mut RestartBackoff, mut uptime: Duration) -> Option<Child> {
        loop {
            let delay = backoff.next_delay(uptime);

            if let Some(max) = self.config.max_restarts {
                if backoff.consecutive_crashes() > max {
                    error!(name = %self.spec.name, max_restarts = max, "process keeps crashing, giving up");
                    self.shared.transition(LifecycleState::Stopped);
                    return None;
                }
            }

            info!(name = %self.spec.name, ?delay, crashes = backoff.consecutive_crashes(), "restarting process");

            tokio::select! {
                _ = sleep(delay) => (),
                _ = self.stop.cancelled() => {
                    self.shared.transition(LifecycleState::Stopped);
                    return None;
                }
            }

            self.shared.transition(LifecycleState::Starting);
            if self.stop.is_cancelled() {
                self.shared.transition(LifecycleState::Stopped);
                return None;
            }

            match fork::new_process(&self.spec, StdIoConf::default()) {
                Ok(child) => {
                    self.shared
                        .transition_with(LifecycleState::Running, child.id());
                    return Some(child);
                }
                Err(e) => {
                    warn!(name = %self.spec.name, "restart failed: {}", e);
                    self.shared.transition(LifecycleState::Crashed);
                    uptime = Duration::ZERO;
                }
            }
        }
    }
}

/// Signals every process in the group led by `pid`, false once the group is gone
fn signal_group(name: &str, pid: u32, signal: Signal) -> bool {
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            debug!(name, pid, %signal, "failed to signal process group: {}", e);
            false
        }
    }
}

/// SIGTERM to the process group, then SIGKILL once `grace` has passed; returns after the leader
///   is reaped and the rest of the group has been killed
async fn terminate(name: &str, child: &mut Child, grace: Duration) -> Result<(), Error> {
    let pid = match child.id() {
        Some(pid) => pid,
        // already reaped
        None => return Ok(()),
    };

    info!(name, pid, "stopping process");
    signal_group(name, pid, Signal::SIGTERM);

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            info!(name, %status, "process stopped");
            if signal_group(name, pid, Signal::SIGKILL) {
                debug!(name, pid, "killed processes left in the group");
            }
            return Ok(());
        }
        Ok(Err(e)) => warn!(name, "failed waiting on process: {}", e),
        Err(_) => warn!(name, ?grace, "process did not exit within grace period, killing it"),
    }

    signal_group(name, pid, Signal::SIGKILL);
    child.kill().await.map_err(|source| ErrorKind::StopTimeout {
        name: name.to_string(),
        source,
    })?;

    info!(name, "process killed");
    Ok(())
}
