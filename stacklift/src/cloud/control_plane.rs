//! Stack lifecycle API

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::models::stack::{
    ChangeSetDescription, ChangeSetRequest, Export, StackDescription, StackEventPage,
    TemplateParameter,
};

/// Control-plane client trait for testability
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Describe a stack by name or id. `None` when the stack does not exist.
    async fn describe_stack(
        &self,
        stack_name_or_id: &str,
    ) -> Result<Option<StackDescription>, DeployError>;

    /// Declared parameters of a template body
    async fn validate_template(
        &self,
        template_body: &str,
    ) -> Result<Vec<TemplateParameter>, DeployError>;

    /// Submit a change set, returning the id of the (possibly new) stack
    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<String, DeployError>;

    /// Status and the complete ordered change list of a change set
    async fn describe_change_set(
        &self,
        stack_name_or_id: &str,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription, DeployError>;

    async fn execute_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<(), DeployError>;

    async fn delete_stack(&self, stack_name: &str) -> Result<(), DeployError>;

    /// All exports of the region
    async fn list_exports(&self) -> Result<Vec<Export>, DeployError>;

    /// One page of events, newest first. A stack that does not exist has no events.
    async fn describe_stack_events(
        &self,
        stack_name_or_id: &str,
        next_token: Option<String>,
    ) -> Result<StackEventPage, DeployError>;
}

/// Find the value of a named export
pub async fn get_export_value(
    client: &dyn ControlPlane,
    export_name: &str,
) -> Result<String, DeployError> {
    client
        .list_exports()
        .await?
        .into_iter()
        .find(|export| export.name == export_name)
        .map(|export| export.value)
        .ok_or_else(|| {
            DeployError::ConfigError(format!("Failed to get a export value: {}", export_name))
        })
}
