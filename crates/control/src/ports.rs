use qa_models::ProvisionerError;
use std::collections::HashSet;
use tokio::sync::Mutex;

use crate::store::StateStore;

/// Hands out host ports for image-mode environments.
///
/// A port stays reserved from `reserve` until `release`; callers release it
/// once the environment is in the ledger (which then keeps it taken) or once
/// provisioning is abandoned.
pub struct PortAllocator {
    start: u16,
    end: u16,
    in_flight: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn reserve(&self, store: &StateStore) -> Result<u16, ProvisionerError> {
        let mut in_flight = self.in_flight.lock().await;
        let used = store.ports().await;

        let port = (self.start..=self.end)
            .find(|p| !used.contains(p) && !in_flight.contains(p))
            .ok_or(ProvisionerError::NoFreePort {
                start: self.start,
                end: self.end,
            })?;

        in_flight.insert(port);
        Ok(port)
    }

    pub async fn release(&self, port: u16) {
        self.in_flight.lock().await.remove(&port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_models::EnvironmentRecord;

    async fn store_with_ports(ports: &[u16]) -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(&dir.path().join("state.json")).await.unwrap();
        for (i, port) in ports.iter().enumerate() {
            let record = EnvironmentRecord {
                branch: "b".into(),
                sha: "s".into(),
                url: "u".into(),
                port: *port,
                workdir: "w".into(),
                created_at: 0,
                expires_at: 0,
                service: "web".into(),
                mode: None,
            };
            store.insert(&format!("env-{i}"), record).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn picks_lowest_free_port() {
        let (_dir, store) = store_with_ports(&[8080, 8082]).await;
        let ports = PortAllocator::new(8080, 8090);

        assert_eq!(ports.reserve(&store).await.unwrap(), 8081);
        assert_eq!(ports.reserve(&store).await.unwrap(), 8083);

        ports.release(8081).await;
        assert_eq!(ports.reserve(&store).await.unwrap(), 8081);
    }

    #[tokio::test]
    async fn exhausted_range_is_an_error() {
        let (_dir, store) = store_with_ports(&[9000]).await;
        let ports = PortAllocator::new(9000, 9001);

        assert_eq!(ports.reserve(&store).await.unwrap(), 9001);
        let err = ports.reserve(&store).await.unwrap_err();
        assert!(matches!(err, ProvisionerError::NoFreePort { start: 9000, end: 9001 }));
    }
}
