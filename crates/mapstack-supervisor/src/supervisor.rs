//! ProcessSupervisor — registry of running external processes.
//!
//! Each tracked process has a slot holding its pid, readiness latch and
//! an exit signal. A background waiter per process observes the exit,
//! drains the remaining output, removes the slot and only then emits
//! [`ProcessEvent::Exited`] and wakes any pending `stop()`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::process::Child;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{SupervisorError, SupervisorResult};
use crate::output::{OutputStream, Readiness, forward_lines};
use crate::process::{
    ExitInfo, LaunchOptions, LaunchSpec, ProcessEvent, ProcessEvents, ProcessState,
};

/// Grace period between SIGTERM and SIGKILL in `stop()`.
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the waiter keeps reading output after the process exited.
/// Grandchildren holding the pipes open would otherwise block forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Registry entry of one running process.
struct ProcessSlot {
    pid: Option<u32>,
    readiness: Arc<Readiness>,
    terminated: Arc<AtomicBool>,
    exited: watch::Receiver<bool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessSlot {
    /// The pid while the process is unreaped. Once the waiter has reaped
    /// it the pid may belong to an unrelated process.
    fn live_pid(&self) -> Option<u32> {
        if self.terminated.load(Ordering::SeqCst) {
            None
        } else {
            self.pid
        }
    }
}

/// Launches, tracks and terminates named external processes.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct ProcessSupervisor {
    slots: Arc<RwLock<HashMap<String, ProcessSlot>>>,
    stop_timeout: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Set how long `stop()` waits after SIGTERM before killing.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Start `spec` under `id`.
    ///
    /// Fails with [`SupervisorError::AlreadyRunning`] if `id` is tracked.
    /// The returned stream yields at most one `Ready` and exactly one
    /// `Exited`, in that order.
    pub async fn launch(
        &self,
        id: &str,
        spec: &LaunchSpec,
        options: LaunchOptions,
    ) -> SupervisorResult<ProcessEvents> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(id) {
            return Err(SupervisorError::AlreadyRunning(id.to_string()));
        }

        info!(process = %id, command = %spec.display_line(), "launching process");

        let mut child = spec
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                id: id.to_string(),
                program: spec.program.clone(),
                source,
            })?;
        let pid = child.id();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let readiness = Readiness::new(options.readiness_pattern, event_tx.clone());
        if !readiness.has_pattern() {
            readiness.fire();
        }

        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(
                id.to_string(),
                stdout,
                OutputStream::Stdout,
                Arc::clone(&readiness),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(
                id.to_string(),
                stderr,
                OutputStream::Stderr,
                Arc::clone(&readiness),
            )));
        }

        let (exit_tx, exit_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = oneshot::channel();
        let terminated = Arc::new(AtomicBool::new(false));

        slots.insert(
            id.to_string(),
            ProcessSlot {
                pid,
                readiness,
                terminated: Arc::clone(&terminated),
                exited: exit_rx,
                kill_tx: Some(kill_tx),
            },
        );
        drop(slots);

        debug!(process = %id, ?pid, "process spawned");

        tokio::spawn(supervise(
            id.to_string(),
            child,
            kill_rx,
            forwarders,
            terminated,
            event_tx,
            exit_tx,
            Arc::clone(&self.slots),
        ));

        Ok(event_rx)
    }

    /// Terminate `id` and wait until it has exited.
    ///
    /// Sends SIGTERM first and escalates to a kill after the stop timeout.
    /// Stopping an untracked id is a no-op.
    pub async fn stop(&self, id: &str) -> SupervisorResult<()> {
        let (reaped, pid, mut exited, mut kill_tx) = {
            let mut slots = self.slots.write().await;
            let Some(slot) = slots.get_mut(id) else {
                debug!(process = %id, "stop requested for untracked process");
                return Ok(());
            };
            let reaped = slot.terminated.load(Ordering::SeqCst);
            (reaped, slot.live_pid(), slot.exited.clone(), slot.kill_tx.take())
        };

        if reaped {
            debug!(process = %id, "process already exited, waiting for cleanup");
            wait_exited(&mut exited).await;
            return Ok(());
        }

        info!(process = %id, "stopping process");

        let signalled = pid.is_some_and(|pid| terminate_gracefully(id, pid));
        if !signalled {
            if let Some(tx) = kill_tx.take() {
                let _ = tx.send(());
            }
        }

        if tokio::time::timeout(self.stop_timeout, wait_exited(&mut exited))
            .await
            .is_err()
        {
            warn!(
                process = %id,
                timeout_secs = self.stop_timeout.as_secs(),
                "process did not exit after SIGTERM, killing"
            );
            if let Some(tx) = kill_tx.take() {
                let _ = tx.send(());
            }
            wait_exited(&mut exited).await;
        }

        Ok(())
    }

    /// Stop every tracked process.
    pub async fn stop_all(&self) {
        let ids = self.running().await;
        if ids.is_empty() {
            return;
        }

        info!(count = ids.len(), "stopping all processes");
        for result in join_all(ids.iter().map(|id| self.stop(id))).await {
            if let Err(e) = result {
                warn!(error = %e, "failed to stop process");
            }
        }
    }

    /// Whether `id` is currently tracked.
    pub async fn is_running(&self, id: &str) -> bool {
        self.slots.read().await.contains_key(id)
    }

    /// Lifecycle status of `id`, or `None` if it is not tracked.
    pub async fn status(&self, id: &str) -> Option<ProcessState> {
        let slots = self.slots.read().await;
        let slot = slots.get(id)?;
        Some(if slot.terminated.load(Ordering::SeqCst) {
            ProcessState::Exited
        } else if slot.readiness.is_ready() {
            ProcessState::Running
        } else {
            ProcessState::Starting
        })
    }

    /// Identifiers of all tracked processes.
    pub async fn running(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }

    /// Run a helper tool under `id` and wait for it to exit.
    ///
    /// The tool goes through the same registry and output forwarding as
    /// long-running services, so `stop(id)` and `stop_all()` reach it.
    pub async fn run_to_completion(
        &self,
        id: &str,
        spec: &LaunchSpec,
    ) -> SupervisorResult<ExitInfo> {
        let mut events = self.launch(id, spec, LaunchOptions::default()).await?;
        while let Some(event) = events.recv().await {
            if let ProcessEvent::Exited(info) = event {
                return Ok(info);
            }
        }
        Ok(ExitInfo::default())
    }
}

/// Waiter task: observe the exit, clean up, then report it.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    id: String,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    mut forwarders: Vec<JoinHandle<()>>,
    terminated: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    exit_tx: watch::Sender<bool>,
    slots: Arc<RwLock<HashMap<String, ProcessSlot>>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!(process = %id, error = %e, "failed to kill process");
            }
            child.wait().await
        }
    };
    terminated.store(true, Ordering::SeqCst);

    let info = match status {
        Ok(status) => ExitInfo::from_status(status),
        Err(e) => {
            error!(process = %id, error = %e, "failed to wait for process");
            ExitInfo::default()
        }
    };

    // Drain remaining output so a late readiness line is reported before the exit.
    let drained = tokio::time::timeout(
        OUTPUT_DRAIN_TIMEOUT,
        join_all(forwarders.iter_mut()),
    )
    .await;
    if drained.is_err() {
        debug!(process = %id, "output still open after exit, detaching");
        for handle in &forwarders {
            handle.abort();
        }
    }

    slots.write().await.remove(&id);

    if info.success() {
        info!(process = %id, %info, "process exited");
    } else {
        warn!(process = %id, %info, "process exited abnormally");
    }

    let _ = events.send(ProcessEvent::Exited(info));
    let _ = exit_tx.send(true);
}

async fn wait_exited(exited: &mut watch::Receiver<bool>) {
    let _ = exited.wait_for(|done| *done).await;
}

/// Deliver SIGTERM. Returns false if the caller should fall back to a kill.
#[cfg(unix)]
fn terminate_gracefully(id: &str, pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        // Already gone; the waiter will report the exit.
        Err(Errno::ESRCH) => true,
        Err(e) => {
            warn!(process = %id, error = %e, "failed to send SIGTERM");
            false
        }
    }
}

#[cfg(not(unix))]
fn terminate_gracefully(_id: &str, _pid: u32) -> bool {
    false
}
