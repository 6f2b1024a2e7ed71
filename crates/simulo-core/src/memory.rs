//! In-process collaborators.
//!
//! Used by the test suites and by the development server, which can seed
//! the project store from a JSON file. Nothing here survives a restart.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::{AuthError, StoreError};
use crate::external::{
    IdentityProvider, MachineAssets, ObjectStore, Project, ProjectStore, UserIdentity,
};
use crate::messages::MachineId;

/// One appended deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Deployment {
    pub source: String,
    pub artifact_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRecord {
    pub owner: String,

    #[serde(default = "empty_scene")]
    pub scene: String,

    /// Auxiliary asset keys shipped to machines running this project.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Oldest first.
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineRecord {
    pub public_key: String,

    #[serde(default)]
    pub project: Option<String>,
}

fn empty_scene() -> String {
    "[]".to_string()
}

/// Seed document accepted by [`MemoryProjectStore::from_seed`].
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub projects: HashMap<String, ProjectRecord>,

    #[serde(default)]
    pub machines: HashMap<i64, MachineRecord>,

    /// Bearer token → user id, for [`MemoryIdentityProvider`].
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Seed {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<String, ProjectRecord>>,
    machines: RwLock<HashMap<MachineId, MachineRecord>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        MemoryProjectStore {
            projects: RwLock::new(seed.projects),
            machines: RwLock::new(
                seed.machines
                    .into_iter()
                    .map(|(id, record)| (MachineId(id), record))
                    .collect(),
            ),
        }
    }

    pub async fn insert_project(&self, id: impl Into<String>, owner: impl Into<String>, scene: impl Into<String>) {
        self.projects.write().await.insert(
            id.into(),
            ProjectRecord {
                owner: owner.into(),
                scene: scene.into(),
                assets: Vec::new(),
                deployments: Vec::new(),
            },
        );
    }

    /// Returns whether the project existed.
    pub async fn remove_project(&self, id: &str) -> bool {
        self.projects.write().await.remove(id).is_some()
    }

    pub async fn insert_machine(&self, id: MachineId, public_key: impl Into<String>, project: Option<String>) {
        self.machines.write().await.insert(
            id,
            MachineRecord {
                public_key: public_key.into(),
                project,
            },
        );
    }

    pub async fn add_asset(&self, project_id: &str, key: impl Into<String>) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let record = projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", project_id)))?;
        record.assets.push(key.into());
        Ok(())
    }

    /// Current scene text of a project.
    pub async fn scene(&self, project_id: &str) -> Option<String> {
        self.projects.read().await.get(project_id).map(|p| p.scene.clone())
    }

    pub async fn deployments(&self, project_id: &str) -> Vec<Deployment> {
        self.projects
            .read()
            .await
            .get(project_id)
            .map(|p| p.deployments.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get_project(&self, project_id: &str) -> Result<Project, StoreError> {
        let projects = self.projects.read().await;
        let record = projects
            .get(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", project_id)))?;

        Ok(Project {
            owner: record.owner.clone(),
            scene: record.scene.clone(),
            latest_source: record.deployments.last().map(|d| d.source.clone()),
        })
    }

    async fn update_scene(&self, project_id: &str, scene: &str) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let record = projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", project_id)))?;
        record.scene = scene.to_string();
        Ok(())
    }

    async fn append_deployment(
        &self,
        project_id: &str,
        source: &str,
        artifact_key: &str,
    ) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let record = projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", project_id)))?;
        record.deployments.push(Deployment {
            source: source.to_string(),
            artifact_key: artifact_key.to_string(),
        });
        Ok(())
    }

    async fn device_public_key(&self, machine_id: MachineId) -> Result<String, StoreError> {
        self.machines
            .read()
            .await
            .get(&machine_id)
            .map(|m| m.public_key.clone())
            .ok_or_else(|| StoreError::NotFound(format!("machine {}", machine_id)))
    }

    async fn machine_assets(&self, machine_id: MachineId) -> Result<MachineAssets, StoreError> {
        let project_id = {
            let machines = self.machines.read().await;
            let machine = machines
                .get(&machine_id)
                .ok_or_else(|| StoreError::NotFound(format!("machine {}", machine_id)))?;
            match &machine.project {
                Some(p) => p.clone(),
                None => return Ok(MachineAssets::default()),
            }
        };

        let projects = self.projects.read().await;
        let Some(project) = projects.get(&project_id) else {
            return Ok(MachineAssets::default());
        };

        Ok(MachineAssets {
            program: project.deployments.last().map(|d| d.artifact_key.clone()),
            extras: project.assets.clone(),
        })
    }
}

/// Object store backed by a map.
///
/// Presigned URLs use a `memory://` scheme and are only meaningful to
/// tests.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    max_object_size: Option<usize>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject puts larger than `limit` bytes.
    pub fn with_max_object_size(limit: usize) -> Self {
        MemoryObjectStore {
            objects: RwLock::default(),
            max_object_size: Some(limit),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        if let Some(limit) = self.max_object_size {
            if data.len() > limit {
                return Err(StoreError::Backend(format!(
                    "object {} is {} bytes, limit {}",
                    key,
                    data.len(),
                    limit
                )));
            }
        }
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        if !self.objects.read().await.contains_key(key) {
            return Err(StoreError::NotFound(format!("object {}", key)));
        }
        Ok(format!("memory://{}?ttl={}", key, ttl.as_secs()))
    }

    async fn content_hash(&self, key: &str) -> Result<[u8; 32], StoreError> {
        let objects = self.objects.read().await;
        let data = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(format!("object {}", key)))?;
        Ok(Sha256::digest(data).into())
    }
}

/// Identity provider backed by a fixed token table.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    tokens: HashMap<String, String>,
}

impl MemoryIdentityProvider {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        MemoryIdentityProvider { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn resolve_user(&self, token: &str) -> Result<UserIdentity, AuthError> {
        self.tokens
            .get(token)
            .map(|id| UserIdentity { id: id.clone() })
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn machine_assets_follow_latest_deployment() {
        let store = MemoryProjectStore::new();
        store.insert_project("p1", "alice", "[]").await;
        store.insert_machine(MachineId(4), "pem", Some("p1".into())).await;
        store.add_asset("p1", "img-1").await.unwrap();

        assert_eq!(store.machine_assets(MachineId(4)).await.unwrap().program, None);

        store.append_deployment("p1", "v1", "a01").await.unwrap();
        store.append_deployment("p1", "v2", "a02").await.unwrap();

        let assets = store.machine_assets(MachineId(4)).await.unwrap();
        assert_eq!(assets.program.as_deref(), Some("a02"));
        assert_eq!(assets.extras, vec!["img-1".to_string()]);

        let project = store.get_project("p1").await.unwrap();
        assert_eq!(project.latest_source.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn unknown_machine_is_not_found() {
        let store = MemoryProjectStore::new();
        let err = store.device_public_key(MachineId(9)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn object_hash_is_sha256() {
        let store = MemoryObjectStore::new();
        store.put("k", b"abc".to_vec()).await.unwrap();
        let hash = store.content_hash("k").await.unwrap();
        assert_eq!(hash[..4], [0xba, 0x78, 0x16, 0xbf]);
    }

    #[tokio::test]
    async fn size_limit_rejects_puts() {
        let store = MemoryObjectStore::with_max_object_size(2);
        assert!(store.put("big", vec![0; 3]).await.is_err());
        assert!(store.is_empty().await);
    }

    #[test]
    fn seed_parses_integer_machine_keys() {
        let seed = Seed::from_json(
            r#"{"projects":{"1":{"owner":"u"}},"machines":{"7":{"public_key":"k","project":"1"}},"tokens":{"t":"u"}}"#,
        )
        .unwrap();
        assert_eq!(seed.projects["1"].scene, "[]");
        assert_eq!(seed.machines[&7].project.as_deref(), Some("1"));
    }
}
