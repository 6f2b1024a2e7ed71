//! Contracts of the collaborators the hub relies on.
//!
//! Persistence, identity, object storage and code generation are owned by
//! other systems; the hub only needs the operations below. Production
//! adapters live in `simulo-server`, in-memory ones in [`crate::memory`].

use std::time::Duration;

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::error::{AuthError, GenerationError, StoreError};
use crate::messages::MachineId;

/// An authenticated editor user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
}

/// Project fields the hub reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// User id of the owner.
    pub owner: String,

    /// Scene document as JSON text.
    pub scene: String,

    /// Source text of the most recent deployment, if any.
    pub latest_source: Option<String>,
}

/// Object keys a machine must download at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineAssets {
    /// Artifact of the latest deployment of the machine's project.
    pub program: Option<String>,

    /// Auxiliary assets of that project.
    pub extras: Vec<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to the user it was issued to.
    async fn resolve_user(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, project_id: &str) -> Result<Project, StoreError>;

    /// Replace the whole scene document.
    async fn update_scene(&self, project_id: &str, scene: &str) -> Result<(), StoreError>;

    /// Append an immutable deployment record.
    async fn append_deployment(
        &self,
        project_id: &str,
        source: &str,
        artifact_key: &str,
    ) -> Result<(), StoreError>;

    /// PEM-encoded (SPKI) Ed25519 public key registered for a machine.
    async fn device_public_key(&self, machine_id: MachineId) -> Result<String, StoreError>;

    async fn machine_assets(&self, machine_id: MachineId) -> Result<MachineAssets, StoreError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// A read-only URL for `key` that stops working after `ttl`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;

    /// SHA-256 of the stored content.
    async fn content_hash(&self, key: &str) -> Result<[u8; 32], StoreError>;
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Ask for the next assistant reply. The caller records the reply in
    /// the conversation.
    async fn generate(&self, conversation: &Conversation) -> Result<String, GenerationError>;
}
