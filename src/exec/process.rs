// src/exec/process.rs

//! Single external process runner with a hard deadline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{RenderkitError, Result};

/// Exit code reported when the deadline fired and the process was killed.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the process ended without one (killed by a signal).
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// How long to keep draining stdout/stderr after the process is gone.
///
/// Grandchildren that inherited the pipes can keep them open; output they
/// write after this window is dropped.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Everything needed to launch one external command.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Explicit overlay; applied after `pass_env`.
    pub env: BTreeMap<String, String>,
    /// Names of parent variables copied through. The rest of the parent
    /// environment is not visible to the child.
    pub pass_env: Vec<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            pass_env: vec!["PATH".to_string()],
            timeout,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn pass_env(mut self, names: &[String]) -> Self {
        self.pass_env = names.to_vec();
        self
    }
}

/// What the process did. Failure and timeout are data here, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `spec` to completion or until its deadline.
///
/// - The working directory is created if missing and never removed.
/// - On deadline the child's whole process group is killed and the outcome carries
///   [`TIMEOUT_EXIT_CODE`], `timed_out = true` and whatever output was
///   captured so far.
/// - `Err` only for environment faults: the working directory cannot be
///   created, the program cannot be started, or waiting on it fails.
pub async fn run_process(spec: &ProcessSpec) -> Result<ProcessOutcome> {
    info!(
        program = %spec.program,
        cwd = %spec.working_dir.display(),
        timeout_secs = spec.timeout.as_secs(),
        "starting process"
    );

    tokio::fs::create_dir_all(&spec.working_dir)
        .await
        .map_err(|e| RenderkitError::io_at(&spec.working_dir, e))?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .env_clear();
    for name in spec.pass_env.iter() {
        if let Some(value) = std::env::var_os(name) {
            cmd.env(name, value);
        }
    }
    cmd.envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group; a timeout kills the whole group.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| RenderkitError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = OutputCollector::spawn(child.stdout.take());
    let stderr = OutputCollector::spawn(child.stderr.take());

    let started = Instant::now();
    let (exit_code, timed_out) = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(status_res) => {
            let status = status_res?;
            (status.code().unwrap_or(SIGNAL_EXIT_CODE), false)
        }
        Err(_) => {
            warn!(
                program = %spec.program,
                timeout_secs = spec.timeout.as_secs(),
                "process exceeded its deadline; killing"
            );
            kill_process_group(child.id());
            if let Err(e) = child.kill().await {
                warn!(program = %spec.program, error = %e, "failed to kill timed-out process");
            }
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    let outcome = ProcessOutcome {
        exit_code,
        stdout: stdout.finish().await,
        stderr: stderr.finish().await,
        timed_out,
    };

    info!(
        program = %spec.program,
        exit_code,
        timed_out,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "process exited"
    );

    Ok(outcome)
}

/// SIGKILL the group led by `pid`. The child is its own group leader.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; `pid` leads a group created at spawn.
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Expand `{name}` placeholders in an argv template.
pub fn expand_template(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

/// Render a path for use as a command argument.
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Background reader that keeps everything a pipe produced.
struct OutputCollector {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputCollector {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = pipe.map(|mut pipe| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            debug!(error = %e, "pipe read failed; stopping collector");
                            break;
                        }
                    }
                }
            })
        });
        Self { buf, handle }
    }

    async fn finish(mut self) -> String {
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await.is_err() {
                debug!("output pipe still open after grace period; abandoning reader");
                handle.abort();
            }
        }
        let bytes = self.buf.lock().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
