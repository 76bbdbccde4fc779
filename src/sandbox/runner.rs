//! Controller-side worker management.
//!
//! Each add-on id gets its own worker process running the companion
//! `kodidev-worker` binary. The controller talks to it over stdio and
//! polls with a timeout so a crashed worker is detected as a failure
//! instead of hanging the navigation loop.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::nav::NavigationState;
use super::message::{Message, write_message};

/// How often the controller wakes up to check worker liveness.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a worker gets to exit after a stop request.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// No live process.
    Idle,
    /// An invocation is in flight.
    Executing,
    /// Worker exited cleanly.
    Stopped,
    /// Worker died or misbehaved.
    Failed,
}

/// One worker process pinned to an add-on id.
pub struct ProcessRunner {
    addon_id: String,
    reuse: bool,
    status: WorkerStatus,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    receiver: Option<mpsc::Receiver<Message>>,
    reader: Option<JoinHandle<()>>,
}

impl ProcessRunner {
    /// Creates a runner; the process is spawned on first use.
    #[must_use]
    pub fn new(addon_id: String, reuse: bool) -> Self {
        Self {
            addon_id,
            reuse,
            status: WorkerStatus::Idle,
            child: None,
            stdin: None,
            receiver: None,
            reader: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Path of the worker binary, expected beside the controller.
    fn worker_executable() -> Result<PathBuf> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| Error::ChannelProtocol("cannot locate worker binary".to_string()))?;
        let name = if cfg!(windows) {
            "kodidev-worker.exe"
        } else {
            "kodidev-worker"
        };
        Ok(dir.join(name))
    }

    /// Spawns a fresh worker process and its stdout forwarding thread.
    fn spawn(&mut self) -> Result<()> {
        let worker = Self::worker_executable()?;
        debug!("spawning worker {} for {}", worker.display(), self.addon_id);

        let mut command = Command::new(&worker);
        if !self.reuse {
            command.arg("--single-shot");
        }
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::ChannelProtocol("worker spawned without stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::ChannelProtocol("worker spawned without stdout".to_string())
        })?;

        // Forwarding thread: parse protocol lines off the worker's
        // stdout and hand them to the poll loop. Ends on EOF.
        let (tx, rx) = mpsc::channel();
        let addon_id = self.addon_id.clone();
        let reader = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                match serde_json::from_str::<Message>(line.trim()) {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("worker {}: unreadable message: {}", addon_id, e),
                }
            }
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.receiver = Some(rx);
        self.reader = Some(reader);
        self.status = WorkerStatus::Idle;
        Ok(())
    }

    /// Returns whether the current child process is alive.
    fn is_alive(&mut self) -> bool {
        match self.child {
            Some(ref mut child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Tears down process handles after an exit or kill.
    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stdin = None;
        self.receiver = None;
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }

    /// Runs one execute message to completion.
    ///
    /// `prompt` answers the add-on's blocking input requests; returning
    /// `None` (user cancelled) sends an empty reply. Any way the worker
    /// can fail (add-on error, dead process, protocol garbage) comes
    /// back as an error, never a panic or a hang.
    pub fn execute(
        &mut self,
        message: Message,
        prompt: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<NavigationState> {
        if !self.is_alive() {
            self.reap();
            self.spawn()?;
        }
        self.status = WorkerStatus::Executing;

        let outcome = self.drive(message, prompt);

        match &outcome {
            Ok(_) => {
                self.status = if self.reuse {
                    WorkerStatus::Idle
                } else {
                    WorkerStatus::Stopped
                };
                if !self.reuse {
                    self.reap();
                }
            }
            Err(_) => {
                self.status = WorkerStatus::Failed;
                self.reap();
            }
        }
        outcome
    }

    fn drive(
        &mut self,
        message: Message,
        prompt: &mut dyn FnMut(&str) -> Option<String>,
    ) -> Result<NavigationState> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::WorkerUnresponsive(self.addon_id.clone()))?;
        write_message(stdin, &message)?;

        loop {
            let received = {
                let receiver = self
                    .receiver
                    .as_ref()
                    .ok_or_else(|| Error::WorkerUnresponsive(self.addon_id.clone()))?;
                receiver.recv_timeout(POLL_INTERVAL)
            };

            match received {
                Ok(Message::Prompt { text }) => {
                    let reply = prompt(&text).unwrap_or_default();
                    let stdin = self
                        .stdin
                        .as_mut()
                        .ok_or_else(|| Error::WorkerUnresponsive(self.addon_id.clone()))?;
                    write_message(stdin, &Message::PromptReply { text: reply })?;
                }
                Ok(Message::Result {
                    success: true,
                    state: Some(state),
                }) => return Ok(state),
                Ok(Message::Result { .. }) => {
                    return Err(Error::AddonRuntimeError(self.addon_id.clone()));
                }
                Ok(other) => {
                    return Err(Error::ChannelProtocol(format!(
                        "unexpected message from worker: {:?}",
                        other
                    )));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if !self.is_alive() {
                        // The worker died mid-run; a final message may
                        // still be buffered.
                        if let Some(state) = self.drain_result() {
                            return Ok(state);
                        }
                        return Err(Error::WorkerUnresponsive(self.addon_id.clone()));
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(Error::WorkerUnresponsive(self.addon_id.clone()));
                }
            }
        }
    }

    /// Scans already-buffered messages for a successful result.
    fn drain_result(&mut self) -> Option<NavigationState> {
        let receiver = self.receiver.as_ref()?;
        while let Ok(message) = receiver.try_recv() {
            if let Message::Result {
                success: true,
                state: Some(state),
            } = message
            {
                return Some(state);
            }
        }
        None
    }

    /// Asks the worker to stop and joins it, killing after a grace
    /// period. Safe to call when no worker is live.
    pub fn stop(&mut self) {
        if self.is_alive() {
            if let Some(ref mut stdin) = self.stdin {
                let _ = write_message(stdin, &Message::Stop);
            }
            let deadline = std::time::Instant::now() + STOP_GRACE;
            while std::time::Instant::now() < deadline {
                if !self.is_alive() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        self.reap();
        self.status = WorkerStatus::Stopped;
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pool of live workers, one per add-on id.
pub struct WorkerPool {
    reuse: bool,
    runners: HashMap<String, ProcessRunner>,
}

impl WorkerPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(reuse: bool) -> Self {
        Self {
            reuse,
            runners: HashMap::new(),
        }
    }

    /// Returns the runner pinned to an add-on id, creating it on first
    /// request.
    pub fn runner(&mut self, addon_id: &str) -> &mut ProcessRunner {
        self.runners
            .entry(addon_id.to_string())
            .or_insert_with(|| ProcessRunner::new(addon_id.to_string(), self.reuse))
    }

    /// Number of workers ever handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    /// Returns whether the pool has no workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Stops every live worker.
    pub fn close(&mut self) {
        for runner in self.runners.values_mut() {
            runner.stop();
        }
        self.runners.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_starts_idle() {
        let runner = ProcessRunner::new("plugin.video.example".to_string(), true);
        assert_eq!(runner.status(), WorkerStatus::Idle);
    }

    #[test]
    fn test_stop_without_process_is_noop() {
        let mut runner = ProcessRunner::new("plugin.video.example".to_string(), true);
        runner.stop();
        assert_eq!(runner.status(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_pool_pins_one_runner_per_id() {
        let mut pool = WorkerPool::new(true);
        let _ = pool.runner("plugin.video.a");
        let _ = pool.runner("plugin.video.a");
        let _ = pool.runner("plugin.video.b");
        assert_eq!(pool.len(), 2);

        pool.close();
        assert!(pool.is_empty());
    }
}
