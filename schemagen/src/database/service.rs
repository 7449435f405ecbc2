//! Build-lifetime shared database

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info};

use super::{DatabaseHandle, Provisioner, RunningDatabase};
use crate::error::{CodegenError, Result};

/// Lazily started database shared by every task of one build.
///
/// The first [`acquire`](Self::acquire) starts the instance; concurrent
/// callers wait on the same start and receive the same handle. A failed
/// start is remembered and returned to every caller, it is never retried.
pub struct EphemeralDatabaseService {
    name: String,
    provisioner: Arc<dyn Provisioner>,
    // Err holds the rendered start failure so every waiter can report it
    handle: OnceCell<std::result::Result<DatabaseHandle, String>>,
    running: Mutex<Option<Box<dyn RunningDatabase>>>,
    released: AtomicBool,
}

impl EphemeralDatabaseService {
    pub fn new(name: impl Into<String>, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            name: name.into(),
            provisioner,
            handle: OnceCell::new(),
            running: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a start has been attempted
    pub fn is_started(&self) -> bool {
        self.handle.initialized()
    }

    /// Return the shared handle, starting the database on first use.
    pub async fn acquire(&self) -> Result<DatabaseHandle> {
        if self.released.load(Ordering::SeqCst) {
            return Err(CodegenError::ProvisioningError(format!(
                "database service `{}` has already been released",
                self.name
            )));
        }

        self.handle
            .get_or_init(|| self.start())
            .await
            .clone()
            .map_err(CodegenError::ProvisioningError)
    }

    async fn start(&self) -> std::result::Result<DatabaseHandle, String> {
        info!("Starting ephemeral database `{}`", self.name);
        match self.provisioner.start().await {
            Ok(instance) => {
                let handle = instance.handle().clone();
                *self.running.lock().await = Some(instance);
                info!("Ephemeral database `{}` ready at {}", self.name, handle.url);
                Ok(handle)
            }
            Err(e) => {
                error!("Ephemeral database `{}` failed to start: {}", self.name, e);
                Err(e.to_string())
            }
        }
    }

    /// Stop the database. Only the first call has any effect.
    pub async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let instance = self.running.lock().await.take();
        if let Some(instance) = instance {
            info!("Stopping ephemeral database `{}`", self.name);
            instance.stop().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Provisioner that counts starts and stops
    #[derive(Default)]
    pub(crate) struct CountingProvisioner {
        pub starts: Arc<AtomicUsize>,
        pub stops: Arc<AtomicUsize>,
        pub fail: bool,
    }

    struct FakeDatabase {
        handle: DatabaseHandle,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunningDatabase for FakeDatabase {
        fn handle(&self) -> &DatabaseHandle {
            &self.handle
        }

        async fn stop(self: Box<Self>) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Provisioner for CountingProvisioner {
        async fn start(&self) -> Result<Box<dyn RunningDatabase>> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            // widen the window for concurrent first callers
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                return Err(CodegenError::ProvisioningError("no container runtime".into()));
            }
            Ok(Box::new(FakeDatabase {
                handle: DatabaseHandle {
                    driver: "com.mysql.cj.jdbc.Driver".into(),
                    url: format!("jdbc:mysql://127.0.0.1:{}/test", 33060 + n),
                    user: "root".into(),
                    password: String::new(),
                },
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_starts_once() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let starts = Arc::clone(&provisioner.starts);
        let service = Arc::new(EphemeralDatabaseService::new("mysql", provisioner));

        let handles = futures::future::join_all((0..8).map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.acquire().await })
        }))
        .await;

        let handles: Vec<DatabaseHandle> = handles
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| h == &handles[0]));
    }

    #[tokio::test]
    async fn test_failure_shared_and_not_retried() {
        let provisioner = Arc::new(CountingProvisioner {
            fail: true,
            ..Default::default()
        });
        let starts = Arc::clone(&provisioner.starts);
        let service = EphemeralDatabaseService::new("mysql", provisioner);

        let first = service.acquire().await.unwrap_err();
        let second = service.acquire().await.unwrap_err();
        assert!(matches!(first, CodegenError::ProvisioningError(_)));
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.to_string().contains("no container runtime"));
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_once() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let stops = Arc::clone(&provisioner.stops);
        let service = EphemeralDatabaseService::new("mysql", provisioner);

        service.acquire().await.unwrap();
        service.acquire().await.unwrap();
        service.release().await.unwrap();
        service.release().await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(service.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_release_without_acquire() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let starts = Arc::clone(&provisioner.starts);
        let stops = Arc::clone(&provisioner.stops);
        let service = EphemeralDatabaseService::new("mysql", provisioner);

        service.release().await.unwrap();
        assert!(!service.is_started());
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
    }
}
