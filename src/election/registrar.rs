//! Candidate Registration
//!
//! Creates the election root if needed and this process's ephemeral,
//! sequential candidate node. Sequential creation is not idempotent, so
//! the registrar refuses to create a second node in the same session
//! epoch.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::state::{CandidateKey, SessionEpoch};
use crate::error::{Error, Result, StoreError};
use crate::store::{basename, join_path, CoordinationClient, CreateMode};

/// Registers this process as a candidate
pub struct CandidateRegistrar {
    client: Arc<dyn CoordinationClient>,
    root: String,
    prefix: String,
    /// Written as the candidate node's data
    identity: Vec<u8>,
    /// Key obtained in the most recent epoch that registered
    registration: Mutex<Option<(SessionEpoch, CandidateKey)>>,
}

impl CandidateRegistrar {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        root: impl Into<String>,
        prefix: impl Into<String>,
        identity: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            client,
            root: root.into(),
            prefix: prefix.into(),
            identity: identity.into(),
            registration: Mutex::new(None),
        }
    }

    /// Create the election root and any missing ancestors.
    ///
    /// An existing node is success; any other error is fatal.
    pub async fn ensure_root(&self) -> Result<()> {
        let mut path = String::with_capacity(self.root.len());

        for part in self.root.split('/').filter(|p| !p.is_empty()) {
            path.push('/');
            path.push_str(part);

            match self.client.create(&path, &[], CreateMode::Persistent).await {
                Ok(_) => tracing::info!("created {}", path),
                Err(StoreError::NodeExists) => {
                    tracing::debug!("{} exists (this is normal)", path)
                }
                Err(e) => return Err(Error::store("create", path, e)),
            }
        }

        Ok(())
    }

    /// Create this process's candidate node for `epoch`
    pub async fn register(&self, epoch: SessionEpoch) -> Result<CandidateKey> {
        let mut registration = self.registration.lock().await;
        if let Some((registered_epoch, key)) = registration.as_ref() {
            if *registered_epoch == epoch {
                return Err(Error::AlreadyRegistered {
                    key: key.to_string(),
                    epoch: epoch.value(),
                });
            }
        }

        self.ensure_root().await?;

        let path = join_path(&self.root, &self.prefix);
        let created = self
            .client
            .create(&path, &self.identity, CreateMode::EphemeralSequential)
            .await
            .map_err(|e| Error::store("create", &path, e))?;

        if !created.starts_with(&path) {
            return Err(Error::InvalidPath(created));
        }

        let key = CandidateKey::new(basename(&created));
        tracing::info!("my leader key is {}", created);

        *registration = Some((epoch, key.clone()));
        Ok(key)
    }

    /// Key registered in `epoch`, if any
    pub async fn registered_key(&self, epoch: SessionEpoch) -> Option<CandidateKey> {
        match self.registration.lock().await.as_ref() {
            Some((registered_epoch, key)) if *registered_epoch == epoch => Some(key.clone()),
            _ => None,
        }
    }
}
