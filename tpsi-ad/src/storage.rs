//! Output collaborator for released associated data.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::server::{RecoveredItem, ThresholdOutcome};
use crate::voucher::ItemId;
use crate::{ClientId, Result};

/// Where released associated data is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Persists released associated data under a per-client namespace.
pub trait RecoveredStore {
    fn persist(&self, client: &ClientId, item: &RecoveredItem) -> Result<()>;
}

/// Writes each item to `<root>/<client>/<id>.bin`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    config: StorageConfig,
}

impl DirectoryStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn client_dir(&self, client: &ClientId) -> PathBuf {
        self.config.root.join(client.as_str())
    }

    pub fn path_for(&self, client: &ClientId, id: ItemId) -> PathBuf {
        self.client_dir(client).join(format!("{id}.bin"))
    }
}

impl RecoveredStore for DirectoryStore {
    fn persist(&self, client: &ClientId, item: &RecoveredItem) -> Result<()> {
        fs::create_dir_all(self.client_dir(client))?;

        let path = self.path_for(client, item.id);
        fs::write(&path, &item.data)?;
        log::debug!("stored item {} of client {client} at {}", item.id, path.display());

        Ok(())
    }
}

impl ThresholdOutcome {
    /// Hands every released item to `store`. Returns how many were stored.
    pub fn persist<S: RecoveredStore + ?Sized>(&self, client: &ClientId, store: &S) -> Result<usize> {
        let recovered = self.recovered();
        for item in recovered {
            store.persist(client, item)?;
        }
        Ok(recovered.len())
    }
}
