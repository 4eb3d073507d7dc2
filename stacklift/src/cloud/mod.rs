//! Cloud clients: the control plane that owns stacks and the object store that holds bundles

pub mod aws;
pub mod control_plane;
pub mod object_store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::DeployError;
use control_plane::ControlPlane;
use object_store::ObjectStore;

/// Hands out clients; the control plane is regional
#[async_trait]
pub trait CloudConnector: Send + Sync {
    async fn control_plane(&self, region: &str) -> Result<Arc<dyn ControlPlane>, DeployError>;

    async fn object_store(&self) -> Result<Arc<dyn ObjectStore>, DeployError>;
}
