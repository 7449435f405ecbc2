//! MySQL container provisioning via testcontainers

use async_trait::async_trait;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::mysql::Mysql;
use tracing::debug;

use super::{DatabaseHandle, Provisioner, RunningDatabase};
use crate::error::{CodegenError, Result};

const MYSQL_PORT: u16 = 3306;
const MYSQL_DRIVER: &str = "com.mysql.cj.jdbc.Driver";
const MYSQL_DATABASE: &str = "test";
const MYSQL_USER: &str = "root";

/// Starts a throwaway MySQL server in a container.
///
/// The module waits for the server's ready log line, so `start` returns
/// only once the server accepts connections.
#[derive(Debug, Clone, Default)]
pub struct MySqlContainerProvisioner {
    image_tag: Option<String>,
}

impl MySqlContainerProvisioner {
    pub fn new(image_tag: Option<String>) -> Self {
        Self { image_tag }
    }
}

struct MySqlContainer {
    container: ContainerAsync<Mysql>,
    handle: DatabaseHandle,
}

fn provisioning_error(e: impl std::fmt::Display) -> CodegenError {
    CodegenError::ProvisioningError(e.to_string())
}

#[async_trait]
impl Provisioner for MySqlContainerProvisioner {
    async fn start(&self) -> Result<Box<dyn RunningDatabase>> {
        let container = match &self.image_tag {
            Some(tag) => Mysql::default().with_tag(tag).start().await,
            None => Mysql::default().start().await,
        }
        .map_err(provisioning_error)?;

        let host = container.get_host().await.map_err(provisioning_error)?;
        let port = container
            .get_host_port_ipv4(MYSQL_PORT)
            .await
            .map_err(provisioning_error)?;
        debug!("MySQL container {} listening on {}:{}", container.id(), host, port);

        let handle = DatabaseHandle {
            driver: MYSQL_DRIVER.to_string(),
            url: format!("jdbc:mysql://{}:{}/{}", host, port, MYSQL_DATABASE),
            user: MYSQL_USER.to_string(),
            password: String::new(),
        };
        Ok(Box::new(MySqlContainer { container, handle }))
    }
}

#[async_trait]
impl RunningDatabase for MySqlContainer {
    fn handle(&self) -> &DatabaseHandle {
        &self.handle
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        debug!("Removing MySQL container {}", self.container.id());
        self.container.rm().await.map_err(provisioning_error)
    }
}
