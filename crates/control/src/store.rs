use qa_models::{EnvironmentLedger, EnvironmentRecord, ProvisionerError};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// JSON ledger of provisioned environments. Every mutation is written back to
/// disk before the lock is released.
pub struct StateStore {
    path: PathBuf,
    ledger: RwLock<EnvironmentLedger>,
}

fn state_error(path: &Path, e: impl std::fmt::Display) -> ProvisionerError {
    ProvisionerError::StateError {
        reason: format!("{}: {e}", path.display()),
    }
}

impl StateStore {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    #[instrument]
    pub async fn open(path: &Path) -> Result<Self, ProvisionerError> {
        let ledger = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| state_error(path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EnvironmentLedger::new(),
            Err(e) => return Err(state_error(path, e)),
        };

        info!("Loaded {} environment(s) from {}", ledger.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            ledger: RwLock::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, env_id: &str) -> Option<EnvironmentRecord> {
        self.ledger.read().await.get(env_id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<(String, EnvironmentRecord)> {
        self.ledger
            .read()
            .await
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.ledger.read().await.len()
    }

    /// Size without waiting; `None` while a writer holds the ledger.
    pub fn try_len(&self) -> Option<usize> {
        self.ledger.try_read().ok().map(|ledger| ledger.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.ledger.read().await.is_empty()
    }

    /// Ports recorded by existing environments.
    pub async fn ports(&self) -> HashSet<u16> {
        self.ledger.read().await.values().map(|r| r.port).collect()
    }

    pub async fn insert(
        &self,
        env_id: &str,
        record: EnvironmentRecord,
    ) -> Result<(), ProvisionerError> {
        let mut ledger = self.ledger.write().await;
        let previous = ledger.insert(env_id.to_string(), record);
        if let Err(e) = self.persist(&ledger) {
            match previous {
                Some(previous) => ledger.insert(env_id.to_string(), previous),
                None => ledger.remove(env_id),
            };
            return Err(e);
        }
        Ok(())
    }

    pub async fn remove(&self, env_id: &str) -> Result<Option<EnvironmentRecord>, ProvisionerError> {
        let mut ledger = self.ledger.write().await;
        let removed = ledger.remove(env_id);
        if removed.is_some() {
            self.persist(&ledger)?;
        }
        Ok(removed)
    }

    /// Writes through a temp file in the same directory so a crash never
    /// leaves a truncated ledger behind.
    fn persist(&self, ledger: &EnvironmentLedger) -> Result<(), ProvisionerError> {
        let ordered: BTreeMap<&String, &EnvironmentRecord> = ledger.iter().collect();
        let json = serde_json::to_string_pretty(&ordered).map_err(|e| state_error(&self.path, e))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| state_error(&self.path, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| state_error(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| state_error(&self.path, e.error))?;
        Ok(())
    }
}
