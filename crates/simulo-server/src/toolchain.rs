//! The external compiler behind the compile queue.
//!
//! A [`Toolchain`] fills a sandbox and builds it; the queue owns the
//! sandbox directory and decides what the outcome means.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ToolchainConfig;

/// File inside the sandbox that receives the submitted source.
pub const SOURCE_FILE: &str = "src/game.rs";

/// Exit status and combined stdout/stderr of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub success: bool,
    pub log: String,
}

#[async_trait]
pub trait Toolchain: Send + Sync + 'static {
    /// Populate an empty `sandbox` for `job_id` with the scaffold and `source`.
    async fn prepare(&self, sandbox: &Path, job_id: &str, source: &str) -> io::Result<()>;

    /// Build a prepared sandbox.
    async fn build(&self, sandbox: &Path) -> io::Result<BuildOutput>;

    /// Where a successful build leaves its artifact.
    fn artifact_path(&self, sandbox: &Path, job_id: &str) -> PathBuf;
}

/// `cargo build` of a `cdylib` for a WebAssembly target.
#[derive(Debug, Clone)]
pub struct CargoToolchain {
    template_dir: PathBuf,
    cargo: String,
    target: String,
}

impl CargoToolchain {
    pub fn new(config: &ToolchainConfig) -> Self {
        CargoToolchain {
            template_dir: config.template_dir.clone(),
            cargo: config.cargo.clone(),
            target: config.target.clone(),
        }
    }
}

#[async_trait]
impl Toolchain for CargoToolchain {
    async fn prepare(&self, sandbox: &Path, job_id: &str, source: &str) -> io::Result<()> {
        copy_tree(&self.template_dir, sandbox).await?;
        tokio::fs::write(sandbox.join("Cargo.toml"), render_manifest(job_id)).await?;

        let source_path = sandbox.join(SOURCE_FILE);
        if let Some(parent) = source_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(source_path, source).await
    }

    async fn build(&self, sandbox: &Path) -> io::Result<BuildOutput> {
        debug!(sandbox = %sandbox.display(), target = %self.target, "running cargo build");

        let output = Command::new(&self.cargo)
            .args(["build", "--target", &self.target, "--release"])
            .current_dir(sandbox)
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(BuildOutput {
            success: output.status.success(),
            log,
        })
    }

    fn artifact_path(&self, sandbox: &Path, job_id: &str) -> PathBuf {
        sandbox
            .join("target")
            .join(&self.target)
            .join("release")
            .join(format!("{}.wasm", job_id.replace('-', "_")))
    }
}

/// Manifest of one sandbox crate. The package is named after the job so
/// the artifact name is predictable.
pub fn render_manifest(job_id: &str) -> String {
    format!(
        r#"[package]
name = "{}"
version = "0.1.0"
edition = "2021"

[lib]
crate-type = ["cdylib"]

[profile.release]
opt-level = "s"

[workspace]
"#,
        job_id
    )
}

/// Recursively copy `from` into the existing directory `to`.
async fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    let from = from.to_path_buf();
    let to = to.to_path_buf();

    tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(&from).min_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(&from)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let dest = to.join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest)?;
            } else {
                std::fs::copy(entry.path(), &dest)?;
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_names_package_after_job() {
        let manifest = render_manifest("a0f3");
        assert!(manifest.contains("name = \"a0f3\""));
        assert!(manifest.contains("crate-type = [\"cdylib\"]"));
    }

    #[tokio::test]
    async fn prepare_copies_scaffold_and_writes_source() {
        let template = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(template.path().join("src")).unwrap();
        std::fs::write(template.path().join("src/lib.rs"), "mod game;").unwrap();

        let sandbox = tempfile::tempdir().unwrap();
        let toolchain = CargoToolchain::new(&ToolchainConfig {
            work_dir: PathBuf::from("unused"),
            template_dir: template.path().to_path_buf(),
            cargo: "cargo".into(),
            target: "wasm32-unknown-unknown".into(),
        });

        toolchain
            .prepare(sandbox.path(), "abc", "pub struct Game;")
            .await
            .unwrap();

        let lib = std::fs::read_to_string(sandbox.path().join("src/lib.rs")).unwrap();
        assert_eq!(lib, "mod game;");
        let game = std::fs::read_to_string(sandbox.path().join(SOURCE_FILE)).unwrap();
        assert_eq!(game, "pub struct Game;");
        assert!(sandbox.path().join("Cargo.toml").exists());

        assert_eq!(
            toolchain.artifact_path(sandbox.path(), "abc"),
            sandbox
                .path()
                .join("target/wasm32-unknown-unknown/release/abc.wasm")
        );
    }

    #[tokio::test]
    async fn missing_template_fails_prepare() {
        let sandbox = tempfile::tempdir().unwrap();
        let toolchain = CargoToolchain::new(&ToolchainConfig {
            work_dir: PathBuf::from("unused"),
            template_dir: sandbox.path().join("does-not-exist"),
            cargo: "cargo".into(),
            target: "wasm32-unknown-unknown".into(),
        });
        assert!(toolchain.prepare(sandbox.path(), "abc", "").await.is_err());
    }
}
