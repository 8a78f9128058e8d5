//! Child-process side of the plugin protocol.
//!
//! Requests are written one per line to the plugin's stdin and answered one
//! per line on its stdout. The write half and the process handle live behind
//! one lock, the read half behind another, so `stop` never has to wait for a
//! scan that is still being answered.

use crate::protocol::{
    PluginError, PluginInfo, PluginMethod, PluginRequest, PluginResponse, PluginResult,
    PROTOCOL_VERSION,
};
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a plugin gets to exit on its own after `Shutdown`.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum PluginHostError {
    #[error("plugin could not be spawned: {0}")]
    Spawn(io::Error),
    #[error("plugin {0} was not piped")]
    MissingPipe(&'static str),
    #[error("writing to plugin failed: {0}")]
    Write(io::Error),
    #[error("reading from plugin failed: {0}")]
    Read(io::Error),
    #[error("malformed plugin message: {0}")]
    Malformed(serde_json::Error),
    #[error("plugin reported an error: {}", .0.message)]
    Plugin(PluginError),
    #[error("plugin speaks protocol {actual}, host speaks {expected}")]
    ProtocolMismatch { expected: u32, actual: u32 },
    #[error("plugin answered {method} with the wrong result")]
    UnexpectedResponse { method: &'static str },
    #[error("plugin answered request {received} while {sent} was pending")]
    IdMismatch { sent: u64, received: u64 },
    #[error("plugin process is not running")]
    Terminated,
}

/// How to launch a plugin executable.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl PluginConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }
}

struct Process {
    child: Child,
    stdin: ChildStdin,
}

/// A running plugin process and its request channel.
pub struct ExecPluginHost {
    config: PluginConfig,
    process: Mutex<Option<Process>>,
    responses: Mutex<Option<BufReader<ChildStdout>>>,
    next_id: AtomicU64,
    info: Mutex<Option<PluginInfo>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn method_name(method: &PluginMethod) -> &'static str {
    match method {
        PluginMethod::Initialize => "Initialize",
        PluginMethod::BuildLibrary => "BuildLibrary",
        PluginMethod::Shutdown => "Shutdown",
    }
}

impl ExecPluginHost {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
            responses: Mutex::new(None),
            next_id: AtomicU64::new(1),
            info: Mutex::new(None),
        }
    }

    /// Spawns the plugin and runs the `Initialize` handshake. A plugin that
    /// fails the handshake is stopped before the error is returned.
    pub fn start(&self) -> Result<PluginInfo, PluginHostError> {
        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.args)
            .envs(self.config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(PluginHostError::Spawn)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PluginHostError::MissingPipe("stdio"));
        };
        *lock(&self.responses) = Some(BufReader::new(stdout));
        *lock(&self.process) = Some(Process { child, stdin });

        match self.handshake() {
            Ok(info) => {
                *lock(&self.info) = Some(info.clone());
                Ok(info)
            }
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    /// Asks the plugin to exit and returns without waiting for its answer.
    ///
    /// The process is handed to a reaper thread that kills it if it is still
    /// alive after [`SHUTDOWN_GRACE`]. Killing it closes stdout, so a request
    /// blocked on a reply fails with [`PluginHostError::Terminated`]. The
    /// returned handle may be dropped to detach the reaper.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let Some(Process { child, mut stdin }) = lock(&self.process).take() else {
            return None;
        };
        *lock(&self.info) = None;
        if let Ok(mut responses) = self.responses.try_lock() {
            *responses = None;
        }

        let request = PluginRequest {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            method: PluginMethod::Shutdown,
        };
        if let Ok(line) = serde_json::to_string(&request) {
            if writeln!(stdin, "{line}").is_ok() {
                let _ = stdin.flush();
            }
        }
        drop(stdin);

        let executable = self.config.executable.clone();
        let slot = Arc::new(Mutex::new(Some(child)));
        let reaper = thread::Builder::new()
            .name("plugin-reaper".into())
            .spawn({
                let slot = slot.clone();
                move || {
                    if let Some(child) = lock(&slot).take() {
                        reap(child, &executable);
                    }
                }
            });
        match reaper {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "no reaper thread; killing plugin inline");
                if let Some(mut child) = lock(&slot).take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.process)
            .as_mut()
            .is_some_and(|p| matches!(p.child.try_wait(), Ok(None)))
    }

    pub fn info(&self) -> Option<PluginInfo> {
        lock(&self.info).clone()
    }

    /// Sends one request and blocks until its reply line arrives.
    ///
    /// Requests are serialized on the read half, so replies always pair with
    /// the request that is waiting for them.
    pub fn send_request(&self, method: PluginMethod) -> Result<PluginResult, PluginHostError> {
        let method_label = method_name(&method);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&PluginRequest { id, method })
            .map_err(PluginHostError::Malformed)?;

        let mut responses = lock(&self.responses);
        {
            let mut process = lock(&self.process);
            let process = process.as_mut().ok_or(PluginHostError::Terminated)?;
            writeln!(process.stdin, "{line}").map_err(PluginHostError::Write)?;
            process.stdin.flush().map_err(PluginHostError::Write)?;
        }

        let reader = responses.as_mut().ok_or(PluginHostError::Terminated)?;
        let mut reply = String::new();
        if reader.read_line(&mut reply).map_err(PluginHostError::Read)? == 0 {
            return Err(PluginHostError::Terminated);
        }
        drop(responses);

        let response: PluginResponse =
            serde_json::from_str(&reply).map_err(PluginHostError::Malformed)?;
        if response.id != id {
            return Err(PluginHostError::IdMismatch {
                sent: id,
                received: response.id,
            });
        }
        match response.result {
            PluginResult::Error(err) => Err(PluginHostError::Plugin(err)),
            PluginResult::ShutdownAck => Err(PluginHostError::UnexpectedResponse {
                method: method_label,
            }),
            result => Ok(result),
        }
    }

    fn handshake(&self) -> Result<PluginInfo, PluginHostError> {
        let PluginResult::Initialized(info) = self.send_request(PluginMethod::Initialize)? else {
            return Err(PluginHostError::UnexpectedResponse {
                method: "Initialize",
            });
        };
        if info.protocol_version != PROTOCOL_VERSION {
            return Err(PluginHostError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                actual: info.protocol_version,
            });
        }
        tracing::info!(
            media_type = %info.media_type,
            plugin = %info.name,
            version = %info.version,
            "plugin ready"
        );
        Ok(info)
    }
}

fn reap(mut child: Child, executable: &std::path::Path) {
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(executable = %executable.display(), %status, "plugin exited");
                return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
            _ => break,
        }
    }
    tracing::debug!(executable = %executable.display(), "plugin ignored shutdown; killing");
    let _ = child.kill();
    let _ = child.wait();
}

impl Drop for ExecPluginHost {
    fn drop(&mut self) {
        self.stop();
    }
}
