//! Filesystem object store with expiring signed URLs.
//!
//! Objects are flat files under one root directory. A presigned URL
//! carries its expiry time and an HMAC-SHA256 of the key and expiry
//! under a server secret; `GET /objects/{key}` checks both before
//! serving the file.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use simulo_core::{ObjectStore, StoreError};

use crate::config::ObjectStoreConfig;

type HmacSha256 = Hmac<Sha256>;

pub struct FsObjectStore {
    root: PathBuf,
    base_url: String,
    secret: String,
}

impl FsObjectStore {
    pub fn new(config: &ObjectStoreConfig) -> Self {
        FsObjectStore {
            root: config.root.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
        }
    }

    /// Contents of `key` if the URL parameters are valid at `now`.
    pub async fn read_signed(
        &self,
        key: &str,
        expires: u64,
        signature: &str,
        now: SystemTime,
    ) -> Result<Vec<u8>, StoreError> {
        if !self.verify(key, expires, signature, now) {
            return Err(StoreError::NotFound(format!("object {}", key)));
        }
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| map_io(key, e))
    }

    fn verify(&self, key: &str, expires: u64, signature: &str, now: SystemTime) -> bool {
        if unix_seconds(now) > expires {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        match self.mac(key, expires) {
            // Constant-time comparison.
            Ok(mac) => mac.verify_slice(&signature).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, key: &str, expires: u64) -> Result<HmacSha256, StoreError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| StoreError::Backend(format!("signing key: {}", e)))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn url_for(&self, key: &str, expires: u64) -> Result<String, StoreError> {
        let signature = hex::encode(self.mac(key, expires)?.finalize().into_bytes());
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.base_url, key, expires, signature
        ))
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::Backend(format!("invalid object key {:?}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| map_io(key, e))?;
        tokio::fs::write(&path, data).await.map_err(|e| map_io(key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await.map_err(|e| map_io(key, e))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::NotFound(format!("object {}", key)));
        }
        let expires = unix_seconds(SystemTime::now()) + ttl.as_secs();
        self.url_for(key, expires)
    }

    async fn content_hash(&self, key: &str) -> Result<[u8; 32], StoreError> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| map_io(key, e))?;
        Ok(Sha256::digest(&data).into())
    }
}

fn map_io(key: &str, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(format!("object {}", key))
    } else {
        StoreError::Backend(format!("object {}: {}", key, e))
    }
}

fn unix_seconds(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
