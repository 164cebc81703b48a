//! Process backends.
//!
//! `SubprocessBackend` spawns real processes with a hard timeout.
//! `NativeBackend` answers what it can in-process (system generation
//! listing) and hands everything else to a subprocess backend. The backend
//! is chosen once at startup.

use super::ExecutionStatus;
use crate::command::SYSTEM_PROFILE;
use crate::config::{BackendChoice, BackendSettings};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Polling interval while waiting for a child
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the pipes to close after a timeout kill
const KILL_GRACE: Duration = Duration::from_millis(250);

/// Fully resolved spawn, after privilege prefixing and env scrubbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// Runs under the privilege prefix
    pub elevated: bool,
}

impl SpawnRequest {
    pub fn display_text(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
}

impl ProcessOutput {
    pub fn not_found(program: &str) -> Self {
        Self {
            status: ExecutionStatus::NotFound,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("{}: command not found", program),
            stdout_truncated: false,
        }
    }

    fn spawn_failed(error: &std::io::Error) -> Self {
        Self {
            status: ExecutionStatus::SpawnFailed,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("OS error: {}", error),
            stdout_truncated: false,
        }
    }
}

pub trait ProcessBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, request: &SpawnRequest) -> ProcessOutput;
}

// ============================================================================
// Subprocess
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessBackend;

impl ProcessBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn run(&self, request: &SpawnRequest) -> ProcessOutput {
        let mut command = std::process::Command::new(&request.program);
        command
            .args(&request.args)
            .env_clear()
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Unprivileged children lead their own process group so a timeout
        // kills grandchildren too. The privilege prefix stays in the terminal's
        // group so it can still prompt for a password.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if !request.elevated {
                command.process_group(0);
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProcessOutput::not_found(&request.program);
            }
            Err(e) => return ProcessOutput::spawn_failed(&e),
        };

        let max = request.max_output_bytes;
        let stdout_rx = child.stdout.take().map(|s| spawn_reader(s, max));
        let stderr_rx = child.stderr.take().map(|s| spawn_reader(s, max));

        let (exit, timed_out) = wait_with_timeout(&mut child, request.timeout, request.elevated);

        // after a kill, a stray holder of the pipe must not keep us waiting
        let wait = if timed_out { Some(KILL_GRACE) } else { None };
        let (stdout, stdout_truncated) = collect_output(stdout_rx, wait, max);
        let (mut stderr, _) = collect_output(stderr_rx, wait, max);

        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("Process timed out after {}s and was killed.", request.timeout.as_secs_f64()));
            return ProcessOutput {
                status: ExecutionStatus::Timeout,
                exit_code: None,
                stdout,
                stderr,
                stdout_truncated,
            };
        }

        match exit {
            Ok(status) => {
                let exit_code = status.code();
                ProcessOutput {
                    status: if status.success() {
                        ExecutionStatus::Success
                    } else {
                        ExecutionStatus::NonZeroExit
                    },
                    exit_code,
                    stdout,
                    stderr,
                    stdout_truncated,
                }
            }
            Err(e) => ProcessOutput::spawn_failed(&e),
        }
    }
}

/// Poll until the child exits or `timeout` passes. On timeout the child and
/// its descendants are killed and the child reaped.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    elevated: bool,
) -> (io::Result<std::process::ExitStatus>, bool) {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (Ok(status), false),
            Ok(None) => {}
            Err(e) => return (Err(e), false),
        }
        if start.elapsed() >= timeout {
            if elevated {
                stop_elevated(child);
            } else {
                kill_tree(child);
            }
            return (child.wait(), true);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    // the child leads its own group, so its pid is the group id
    let pgid = child.id() as libc::pid_t;
    // SAFETY: killpg only sends a signal; no memory is shared with the callee.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pgid, error = %io::Error::last_os_error(), "killpg failed, killing child only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// sudo relays SIGTERM to the command it started but cannot relay SIGKILL,
/// so terminate first and only then kill.
#[cfg(unix)]
fn stop_elevated(child: &mut Child) {
    let pid = child.id() as libc::pid_t;
    // SAFETY: kill only sends a signal to our own child.
    unsafe { libc::kill(pid, libc::SIGTERM) };
    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn stop_elevated(child: &mut Child) {
    let _ = child.kill();
}

/// Read a pipe on its own thread, keeping at most `max_bytes + 1` bytes and
/// draining the rest so the child never blocks on a full pipe.
fn spawn_reader<R: Read + Send + 'static>(reader: R, max_bytes: usize) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_capped(reader, max_bytes));
    });
    rx
}

fn read_capped(mut reader: impl Read, max_bytes: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = (&mut reader).take((max_bytes as u64).saturating_add(1)).read_to_end(&mut buf);
    let _ = io::copy(&mut reader, &mut io::sink());
    buf
}

/// Decode what a reader produced. With `wait` set, give up after that long
/// and return nothing for the stream.
fn collect_output(rx: Option<Receiver<Vec<u8>>>, wait: Option<Duration>, max_bytes: usize) -> (String, bool) {
    let bytes = rx
        .and_then(|rx| match wait {
            Some(limit) => rx.recv_timeout(limit).ok(),
            None => rx.recv().ok(),
        })
        .unwrap_or_default();
    truncate_output(&bytes, max_bytes)
}

/// Cut output at `max_bytes`, lossily decoding UTF-8.
pub fn truncate_output(bytes: &[u8], max_bytes: usize) -> (String, bool) {
    let truncated = bytes.len() > max_bytes;
    let slice = if truncated { &bytes[..max_bytes] } else { bytes };
    (String::from_utf8_lossy(slice).to_string(), truncated)
}

// ============================================================================
// Native
// ============================================================================

/// In-process answers for read-only queries the host can serve directly.
pub struct NativeBackend {
    profiles_dir: PathBuf,
    fallback: Arc<dyn ProcessBackend>,
}

impl NativeBackend {
    pub fn new(profiles_dir: impl Into<PathBuf>, fallback: Arc<dyn ProcessBackend>) -> Self {
        Self {
            profiles_dir: profiles_dir.into(),
            fallback,
        }
    }

    fn is_generation_listing(request: &SpawnRequest) -> bool {
        request.program == "nix-env"
            && request.args.len() == 3
            && request.args[0] == "--list-generations"
            && request.args[1] == "--profile"
            && request.args[2] == SYSTEM_PROFILE
    }

    fn list_generations(&self) -> ProcessOutput {
        match read_generations(&self.profiles_dir) {
            Ok(generations) => ProcessOutput {
                status: ExecutionStatus::Success,
                exit_code: Some(0),
                stdout: format_generations(&generations),
                stderr: String::new(),
                stdout_truncated: false,
            },
            Err(e) => {
                tracing::debug!(error = %e, "native generation listing failed, falling back");
                ProcessOutput::spawn_failed(&e)
            }
        }
    }
}

impl ProcessBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn run(&self, request: &SpawnRequest) -> ProcessOutput {
        if Self::is_generation_listing(request) {
            let output = self.list_generations();
            if output.status == ExecutionStatus::Success {
                return output;
            }
        }
        self.fallback.run(request)
    }
}

/// One `system-<N>-link` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub number: u32,
    pub created: Option<DateTime<Local>>,
    pub current: bool,
}

/// Read system generations from a profiles directory.
pub fn read_generations(profiles_dir: &Path) -> std::io::Result<Vec<Generation>> {
    let current = std::fs::read_link(profiles_dir.join("system"))
        .ok()
        .and_then(|target| target.file_name().and_then(|n| parse_generation(&n.to_string_lossy())));

    let mut generations = Vec::new();
    for entry in std::fs::read_dir(profiles_dir)? {
        let entry = entry?;
        let Some(number) = parse_generation(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        let created = std::fs::symlink_metadata(entry.path())
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);
        generations.push(Generation {
            number,
            created,
            current: current == Some(number),
        });
    }
    generations.sort_by_key(|g| g.number);
    Ok(generations)
}

fn parse_generation(name: &str) -> Option<u32> {
    name.strip_prefix("system-")?.strip_suffix("-link")?.parse().ok()
}

/// Same layout as `nix-env --list-generations`.
pub fn format_generations(generations: &[Generation]) -> String {
    generations
        .iter()
        .map(|g| {
            let created = g
                .created
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let marker = if g.current { "   (current)" } else { "" };
            format!("{:>5}   {}{}\n", g.number, created, marker)
        })
        .collect()
}

/// Pick the backend once at startup.
pub fn select_backend(settings: &BackendSettings) -> Arc<dyn ProcessBackend> {
    let subprocess: Arc<dyn ProcessBackend> = Arc::new(SubprocessBackend);
    let native_ready = settings.profiles_dir.join("system").exists();
    let backend: Arc<dyn ProcessBackend> = match settings.choice {
        BackendChoice::Subprocess => subprocess,
        BackendChoice::Native => Arc::new(NativeBackend::new(&settings.profiles_dir, subprocess)),
        BackendChoice::Auto if native_ready => Arc::new(NativeBackend::new(&settings.profiles_dir, subprocess)),
        BackendChoice::Auto => subprocess,
    };
    tracing::debug!(backend = backend.name(), choice = settings.choice.as_str(), "process backend selected");
    backend
}
