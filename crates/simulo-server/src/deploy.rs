//! Prompt → generate → compile → deploy.
//!
//! A request gets at most [`MAX_ATTEMPTS`] generations. Generator
//! failures and compile errors each use up one attempt; compile errors
//! are fed back into the conversation first. An internal compile failure
//! ends the request immediately.

use std::sync::Arc;

use simulo_core::{
    extract_code_block, CodeGenerator, Conversation, ObjectStore, ProjectStore, Scene, StoreError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compile_queue::{CompileQueue, CompiledArtifact, JobResult};

pub const MAX_ATTEMPTS: usize = 2;

/// Fence tag of the code block expected in generator replies.
pub const CODE_LANGUAGE: &str = "rust";

/// System turn of every conversation: what the sandbox offers.
pub const SYSTEM_INSTRUCTIONS: &str = concat!(
    "You write Rust programs for interactive projection mapping installations. ",
    "The program runs in a WebAssembly sandbox, receives body pose detections and ",
    "draws on the projection surface through the API below.\n",
    "Reply with a single complete ```rust code block containing the contents of game.rs. ",
    "Only std and the API below are available; it is already in scope.\n\n",
    "```rust\n",
    include_str!("../../../template/src/simulo.rs"),
    "```\n"
);

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("scene of project {0} is not valid: {1}")]
    InvalidScene(String, String),

    #[error("project store failure: {0}")]
    Store(#[from] StoreError),

    #[error("no program compiled after {attempts} attempts")]
    Exhausted { attempts: usize },

    #[error("compile pipeline failure: {0}")]
    Internal(String),

    #[error("artifact upload failed: {0}")]
    Upload(String),
}

/// A recorded deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Object key of the uploaded artifact (the compile job ID).
    pub artifact_key: String,

    /// Generations used, including the successful one.
    pub attempts: usize,
}

pub struct Deployer {
    projects: Arc<dyn ProjectStore>,
    objects: Arc<dyn ObjectStore>,
    generator: Arc<dyn CodeGenerator>,
    queue: CompileQueue,
}

impl Deployer {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        objects: Arc<dyn ObjectStore>,
        generator: Arc<dyn CodeGenerator>,
        queue: CompileQueue,
    ) -> Self {
        Deployer {
            projects,
            objects,
            generator,
            queue,
        }
    }

    /// Turn `prompt` into a new deployment of `project_id`.
    ///
    /// With `rewrite`, the latest deployed source is given to the
    /// generator as the program to modify.
    pub async fn deploy(
        &self,
        project_id: &str,
        prompt: &str,
        rewrite: bool,
    ) -> Result<DeployOutcome, DeployError> {
        let project = self.projects.get_project(project_id).await.map_err(|e| {
            if e.is_not_found() {
                DeployError::ProjectNotFound(project_id.to_string())
            } else {
                DeployError::Store(e)
            }
        })?;

        let mut scene = Scene::parse(&project.scene)
            .map_err(|e| DeployError::InvalidScene(project_id.to_string(), e.to_string()))?;
        scene.set_prompt(prompt);
        self.projects
            .update_scene(project_id, &scene.to_text())
            .await?;

        let previous = if rewrite {
            project.latest_source.as_deref()
        } else {
            None
        };
        let mut conversation = Conversation::new(SYSTEM_INSTRUCTIONS, prompt, previous);

        let (source, artifact, attempts) = self.compile_with_retries(project_id, &mut conversation).await?;

        let artifact_key = artifact.job_id().to_string();
        let published = self.publish(project_id, &source, &artifact).await;

        if let Err(e) = artifact.cleanup().await {
            warn!(project_id = %project_id, error = %e, "failed to remove sandbox");
        }
        published?;

        info!(project_id = %project_id, artifact = %artifact_key, attempts, "deployment recorded");
        Ok(DeployOutcome {
            artifact_key,
            attempts,
        })
    }

    async fn compile_with_retries(
        &self,
        project_id: &str,
        conversation: &mut Conversation,
    ) -> Result<(String, CompiledArtifact, usize), DeployError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let reply = match self.generator.generate(conversation).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(project_id = %project_id, attempt, error = %e, "generation failed");
                    continue;
                }
            };
            conversation.push_assistant(reply.as_str());

            let Some(code) = extract_code_block(&reply, CODE_LANGUAGE) else {
                warn!(project_id = %project_id, attempt, "reply has no code block");
                continue;
            };
            debug!(project_id = %project_id, attempt, code = %code, "generated program");

            match self.queue.enqueue(code).await {
                JobResult::Success(artifact) => return Ok((code.to_string(), artifact, attempt)),
                JobResult::CompileError { log } => {
                    info!(project_id = %project_id, attempt, "compile error, retrying with feedback");
                    conversation.report_error(&log);
                }
                JobResult::InternalError { cause } => return Err(DeployError::Internal(cause)),
            }
        }

        Err(DeployError::Exhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn publish(
        &self,
        project_id: &str,
        source: &str,
        artifact: &CompiledArtifact,
    ) -> Result<(), DeployError> {
        let bytes = tokio::fs::read(artifact.artifact_path())
            .await
            .map_err(|e| DeployError::Internal(format!("failed to read artifact: {}", e)))?;

        self.objects
            .put(artifact.job_id(), bytes)
            .await
            .map_err(|e| DeployError::Upload(e.to_string()))?;

        self.projects
            .append_deployment(project_id, source, artifact.job_id())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_embed_the_scripting_api() {
        assert!(SYSTEM_INSTRUCTIONS.contains("pub struct GameObject"));
        assert!(SYSTEM_INSTRUCTIONS.trim_end().ends_with("```"));
    }
}
