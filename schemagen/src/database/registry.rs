//! Build-scoped registry of shared services

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use super::{EphemeralDatabaseService, MySqlContainerProvisioner, Provisioner};
use crate::error::Result;
use crate::migration::{MigrationConnector, MySqlConnector};

/// Everything a build shares between its tasks.
///
/// Pass one instance to every task of a build and call
/// [`shutdown`](Self::shutdown) once all of them have finished.
pub struct BuildServices {
    provisioner: Arc<dyn Provisioner>,
    connector: Arc<dyn MigrationConnector>,
    databases: Mutex<BTreeMap<String, Arc<EphemeralDatabaseService>>>,
    // one writer per (service, schema) at a time
    migration_locks: Mutex<BTreeMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl BuildServices {
    pub fn new(provisioner: Arc<dyn Provisioner>, connector: Arc<dyn MigrationConnector>) -> Self {
        Self {
            provisioner,
            connector,
            databases: Mutex::new(BTreeMap::new()),
            migration_locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// MySQL containers, migrated over a native MySQL connection
    pub fn mysql(image_tag: Option<String>) -> Self {
        Self::new(
            Arc::new(MySqlContainerProvisioner::new(image_tag)),
            Arc::new(MySqlConnector),
        )
    }

    /// Service registered under `name`, created on first request
    pub fn database(&self, name: &str) -> Arc<EphemeralDatabaseService> {
        let mut databases = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let service = databases.entry(name.to_string()).or_insert_with(|| {
            Arc::new(EphemeralDatabaseService::new(
                name,
                Arc::clone(&self.provisioner),
            ))
        });
        Arc::clone(service)
    }

    /// Lock serializing migrations of `schema` on the database registered as
    /// `service`. Tasks sharing a schema migrate one after the other and the
    /// later ones find nothing pending.
    pub fn migration_lock(&self, service: &str, schema: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .migration_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry((service.to_string(), schema.to_string()))
                .or_default(),
        )
    }

    pub fn connector(&self) -> &dyn MigrationConnector {
        self.connector.as_ref()
    }

    /// Release every registered service. Failures are logged and the first
    /// one is returned after all services have been attempted.
    pub async fn shutdown(&self) -> Result<()> {
        let services: Vec<_> = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut first_error = None;
        for service in services {
            if let Err(e) = service.release().await {
                warn!("Failed to release `{}`: {}", service.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
