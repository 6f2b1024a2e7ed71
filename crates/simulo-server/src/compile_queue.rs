//! Central compile loop.
//!
//! This task owns the toolchain and processes every submitted program
//! one at a time, in submission order. Callers wait on their own
//! completion channel, not on the queue, so any number of them can be
//! parked while a single build runs.
//!
//! Each job builds in a private sandbox under the work directory. The
//! sandbox is removed before an unsuccessful result is returned; a
//! successful one hands it to the caller inside [`CompiledArtifact`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::toolchain::Toolchain;

/// Outcome of one compile job.
#[derive(Debug)]
pub enum JobResult {
    Success(CompiledArtifact),

    /// The compiler rejected the program; `log` is its combined output.
    CompileError { log: String },

    /// Sandbox setup failed or the toolchain broke its contract.
    InternalError { cause: String },
}

/// A built program and the sandbox it lives in.
///
/// Call [`CompiledArtifact::cleanup`] once the artifact has been
/// consumed. A value dropped without it still removes its sandbox.
#[derive(Debug)]
pub struct CompiledArtifact {
    job_id: String,
    artifact_path: PathBuf,
    sandbox: Sandbox,
}

impl CompiledArtifact {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn sandbox_path(&self) -> &Path {
        self.sandbox.path()
    }

    /// Remove the sandbox, artifact included.
    pub async fn cleanup(self) -> io::Result<()> {
        self.sandbox.remove().await
    }
}

/// A job's working directory, removed exactly once.
struct Sandbox {
    path: PathBuf,
    removed: bool,
}

impl Sandbox {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        tokio::fs::remove_dir_all(&self.path).await
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sandbox({})", self.path.display())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        // Keep the blocking removal off the async workers.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_leftover(&path));
            }
            Err(_) => remove_leftover(&path),
        }
    }
}

fn remove_leftover(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(sandbox = %path.display(), error = %e, "failed to remove sandbox");
        }
    }
}

struct Job {
    source: String,
    done: oneshot::Sender<JobResult>,
}

/// Handle for submitting programs to the compile loop.
#[derive(Clone)]
pub struct CompileQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CompileQueue {
    /// Spawn the compile loop.
    ///
    /// The loop runs until every `CompileQueue` handle is dropped.
    pub fn start(work_dir: PathBuf, toolchain: Arc<dyn Toolchain>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_compile_loop(rx, work_dir, toolchain));
        (CompileQueue { tx }, handle)
    }

    /// Compile `source`, waiting until this job has been processed.
    ///
    /// Dropping the returned future does not cancel the build; its result
    /// is discarded and its sandbox removed.
    pub async fn enqueue(&self, source: impl Into<String>) -> JobResult {
        let (done, result) = oneshot::channel();
        let job = Job {
            source: source.into(),
            done,
        };

        if self.tx.send(job).is_err() {
            return JobResult::InternalError {
                cause: "compile queue is not running".to_string(),
            };
        }

        result.await.unwrap_or_else(|_| JobResult::InternalError {
            cause: "compile worker dropped the job".to_string(),
        })
    }
}

/// Run the central compile loop.
async fn run_compile_loop(
    mut rx: mpsc::UnboundedReceiver<Job>,
    work_dir: PathBuf,
    toolchain: Arc<dyn Toolchain>,
) {
    while let Some(Job { source, done }) = rx.recv().await {
        let result = run_job(&work_dir, toolchain.as_ref(), &source).await;
        // A caller that went away drops the result, and with it the sandbox.
        let _ = done.send(result);
    }

    debug!("Compile loop shutting down (all queue handles dropped)");
}

async fn run_job(work_dir: &Path, toolchain: &dyn Toolchain, source: &str) -> JobResult {
    let job_id = new_job_id();
    info!(job_id = %job_id, "running compile job");

    let sandbox = match create_sandbox(work_dir, &job_id).await {
        Ok(sandbox) => sandbox,
        Err(e) => return internal(&job_id, format!("failed to create sandbox: {}", e)),
    };

    if let Err(e) = toolchain.prepare(sandbox.path(), &job_id, source).await {
        discard(sandbox).await;
        return internal(&job_id, format!("failed to prepare sandbox: {}", e));
    }

    let output = match toolchain.build(sandbox.path()).await {
        Ok(output) => output,
        Err(e) => {
            discard(sandbox).await;
            return internal(&job_id, format!("failed to run compiler: {}", e));
        }
    };

    if !output.success {
        debug!(job_id = %job_id, log = %output.log, "compile failed");
        discard(sandbox).await;
        return JobResult::CompileError { log: output.log };
    }

    let artifact_path = toolchain.artifact_path(sandbox.path(), &job_id);
    if !tokio::fs::try_exists(&artifact_path).await.unwrap_or(false) {
        discard(sandbox).await;
        return internal(
            &job_id,
            format!("build succeeded but {} is missing", artifact_path.display()),
        );
    }

    info!(job_id = %job_id, "compile job succeeded");
    JobResult::Success(CompiledArtifact {
        job_id,
        artifact_path,
        sandbox,
    })
}

async fn create_sandbox(work_dir: &Path, job_id: &str) -> io::Result<Sandbox> {
    tokio::fs::create_dir_all(work_dir).await?;
    let path = work_dir.join(job_id);
    tokio::fs::create_dir(&path).await?;
    Ok(Sandbox {
        path,
        removed: false,
    })
}

async fn discard(sandbox: Sandbox) {
    let path = sandbox.path().to_path_buf();
    if let Err(e) = sandbox.remove().await {
        warn!(sandbox = %path.display(), error = %e, "failed to remove sandbox");
    }
}

fn internal(job_id: &str, cause: String) -> JobResult {
    warn!(job_id = %job_id, cause = %cause, "compile job failed internally");
    JobResult::InternalError { cause }
}

/// A job ID: a letter followed by 32 hex digits, so it is always a valid
/// crate name.
pub fn new_job_id() -> String {
    format!("a{}", hex::encode(rand::random::<[u8; 16]>()))
}
