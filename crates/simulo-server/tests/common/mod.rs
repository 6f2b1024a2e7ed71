//! Stubs and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use simulo_core::memory::{MemoryIdentityProvider, MemoryObjectStore, MemoryProjectStore};
use simulo_core::{ChatMessage, CodeGenerator, Conversation, GenerationError, PresenceRegistry};
use simulo_server::compile_queue::CompileQueue;
use simulo_server::deploy::Deployer;
use simulo_server::server::AppState;
use simulo_server::toolchain::{BuildOutput, Toolchain};
use simulo_server::types::OutboundRx;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Sockets a [`Harness`] hub accepts at once.
pub const MAX_CLIENTS: usize = 16;

/// Marker that makes [`StubToolchain`] report a compile error.
pub const BROKEN: &str = "BROKEN";

/// Marker that makes [`StubToolchain`] succeed without an artifact.
pub const NO_ARTIFACT: &str = "NO_ARTIFACT";

/// Marker that makes [`StubToolchain`] fail while preparing.
pub const SETUP_FAIL: &str = "SETUP_FAIL";

/// Toolchain that "compiles" by copying the source into the artifact.
///
/// Tracks how many builds overlap and the order they ran in.
pub struct StubToolchain {
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    builds: Mutex<Vec<String>>,
}

impl StubToolchain {
    pub fn new(delay: Duration) -> Self {
        StubToolchain {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Sources in the order they were built.
    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl Toolchain for StubToolchain {
    async fn prepare(&self, sandbox: &Path, _job_id: &str, source: &str) -> io::Result<()> {
        if source.contains(SETUP_FAIL) {
            return Err(io::Error::new(io::ErrorKind::Other, "scaffold missing"));
        }
        tokio::fs::create_dir_all(sandbox.join("src")).await?;
        tokio::fs::write(sandbox.join("src/game.rs"), source).await
    }

    async fn build(&self, sandbox: &Path) -> io::Result<BuildOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let source = tokio::fs::read_to_string(sandbox.join("src/game.rs")).await?;
        self.builds.lock().unwrap().push(source.clone());

        let output = if source.contains(BROKEN) {
            BuildOutput {
                success: false,
                log: format!("error[E0425]: cannot find value `{}`", BROKEN),
            }
        } else {
            if !source.contains(NO_ARTIFACT) {
                tokio::fs::write(sandbox.join("out.wasm"), format!("wasm:{}", source)).await?;
            }
            BuildOutput {
                success: true,
                log: String::new(),
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }

    fn artifact_path(&self, sandbox: &Path, _job_id: &str) -> PathBuf {
        sandbox.join("out.wasm")
    }
}

/// Generator that replays a fixed script of replies.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, GenerationError>>) -> Self {
        ScriptedGenerator {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversation as it was at each call.
    pub fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, conversation: &Conversation) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push(conversation.messages().to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

/// A reply carrying `code` in a rust block.
pub fn reply(code: &str) -> Result<String, GenerationError> {
    Ok(format!("Here you go:\n```rust\n{}\n```\n", code))
}

/// A fully wired hub over in-memory collaborators.
pub struct Harness {
    pub state: Arc<AppState>,
    pub projects: Arc<MemoryProjectStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub toolchain: Arc<StubToolchain>,
    pub work: TempDir,
}

impl Harness {
    /// Must be called inside a Tokio runtime (starts the compile loop).
    pub fn new(objects: MemoryObjectStore, script: Vec<Result<String, GenerationError>>) -> Self {
        let projects = Arc::new(MemoryProjectStore::new());
        let objects = Arc::new(objects);
        let generator = Arc::new(ScriptedGenerator::new(script));
        let toolchain = Arc::new(StubToolchain::new(Duration::from_millis(5)));
        let work = tempfile::tempdir().unwrap();

        let (queue, _worker) = CompileQueue::start(work.path().join("sandboxes"), toolchain.clone());
        let deployer = Deployer::new(projects.clone(), objects.clone(), generator.clone(), queue);

        let identity = MemoryIdentityProvider::default()
            .with_token("alice-token", "alice")
            .with_token("bob-token", "bob");

        let state = Arc::new(AppState {
            presence: PresenceRegistry::default(),
            connection_slots: Arc::new(Semaphore::new(MAX_CLIENTS)),
            projects: projects.clone(),
            objects: objects.clone(),
            identity: Arc::new(identity),
            deployer,
            object_files: None,
            allowed_origin: None,
        });

        Harness {
            state,
            projects,
            objects,
            generator,
            toolchain,
            work,
        }
    }

    pub fn sandbox_root(&self) -> PathBuf {
        self.work.path().join("sandboxes")
    }

    /// Sandboxes currently on disk.
    pub fn sandbox_count(&self) -> usize {
        count_entries(&self.sandbox_root())
    }
}

pub fn count_entries(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// Poll until `dir` has no entries; sandboxes dropped without `cleanup`
/// are removed in the background.
pub async fn wait_until_empty(dir: &Path) -> bool {
    for _ in 0..200 {
        if count_entries(dir) == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

/// Everything queued on `rx` so far.
pub fn drain<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

pub fn drain_outbound(rx: &mut OutboundRx) -> Vec<simulo_server::types::Outbound> {
    drain(rx)
}
