//! Ephemeral database provisioning
//!
//! A build shares one disposable database among every task that has no
//! explicit connection. [`BuildServices`] owns it under a fixed name;
//! [`EphemeralDatabaseService`] starts it on first use and stops it once at
//! the end of the build.

mod container;
mod registry;
mod service;

pub use container::*;
pub use registry::*;
pub use service::*;

use async_trait::async_trait;

use crate::error::Result;

/// Connection parameters of a running database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHandle {
    pub driver: String,
    /// JDBC-style URL (`jdbc:mysql://host:port/db`)
    pub url: String,
    pub user: String,
    pub password: String,
}

/// Starts a database instance and waits until it accepts connections.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn start(&self) -> Result<Box<dyn RunningDatabase>>;
}

/// A started database instance
#[async_trait]
pub trait RunningDatabase: Send + Sync {
    fn handle(&self) -> &DatabaseHandle;

    async fn stop(self: Box<Self>) -> Result<()>;
}
