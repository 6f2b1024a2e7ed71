//! Registry of machines that currently hold an authenticated connection.
//!
//! Shared by every connection task: many readers (editor status queries)
//! and occasional writers (machine auth / disconnect). Nothing is
//! persisted; after a restart machines reconnect and re-register.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::messages::MachineId;

/// Owner recorded by [`PresenceRegistry::add`].
const ANONYMOUS: u64 = 0;

/// Cheaply cloneable handle to the shared presence set.
///
/// Each online machine remembers which connection registered it last, so
/// a stale connection going away cannot take down a newer one.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    online: Arc<RwLock<HashMap<MachineId, u64>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as online.
    pub async fn add(&self, id: MachineId) {
        self.claim(id, ANONYMOUS).await;
    }

    /// Mark `id` as offline, whoever registered it.
    pub async fn remove(&self, id: MachineId) {
        self.online.write().await.remove(&id);
    }

    /// Mark `id` as online on behalf of connection `owner`, replacing any
    /// earlier owner.
    pub async fn claim(&self, id: MachineId, owner: u64) {
        self.online.write().await.insert(id, owner);
    }

    /// Mark `id` as offline if `owner` still holds it.
    ///
    /// Returns whether the entry was removed.
    pub async fn release(&self, id: MachineId, owner: u64) -> bool {
        let mut online = self.online.write().await;
        if online.get(&id) == Some(&owner) {
            online.remove(&id);
            true
        } else {
            false
        }
    }

    pub async fn has(&self, id: MachineId) -> bool {
        self.online.read().await.contains_key(&id)
    }

    /// Number of machines currently online.
    pub async fn len(&self) -> usize {
        self.online.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.online.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_remove() {
        let registry = PresenceRegistry::new();
        registry.add(MachineId(7)).await;
        assert!(registry.has(MachineId(7)).await);

        registry.remove(MachineId(7)).await;
        assert!(!registry.has(MachineId(7)).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn removing_an_absent_id_is_harmless() {
        let registry = PresenceRegistry::new();
        registry.remove(MachineId(3)).await;
        assert!(!registry.has(MachineId(3)).await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let registry = PresenceRegistry::new();
        let other = registry.clone();
        other.add(MachineId(1)).await;
        assert!(registry.has(MachineId(1)).await);
    }

    #[tokio::test]
    async fn stale_owner_cannot_release_a_newer_claim() {
        let registry = PresenceRegistry::new();
        registry.claim(MachineId(5), 1).await;
        registry.claim(MachineId(5), 2).await;

        assert!(!registry.release(MachineId(5), 1).await);
        assert!(registry.has(MachineId(5)).await);

        assert!(registry.release(MachineId(5), 2).await);
        assert!(!registry.has(MachineId(5)).await);
    }

    #[tokio::test]
    async fn release_of_unknown_id_is_a_no_op() {
        let registry = PresenceRegistry::new();
        assert!(!registry.release(MachineId(8), 1).await);
        assert!(registry.is_empty().await);
    }
}
