//! AWS implementations: CloudFormation control plane and S3 object store

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::primitives::DateTime as SmithyDateTime;
use aws_sdk_cloudformation::types::{Capability, Parameter};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cloud::control_plane::ControlPlane;
use crate::cloud::object_store::ObjectStore;
use crate::cloud::CloudConnector;
use crate::errors::DeployError;
use crate::models::outcome::ResourceChange;
use crate::models::stack::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetType, Export, StackDescription, StackEvent,
    StackEventPage, TemplateParameter,
};

/// Builds SDK clients from the default credential chain
#[derive(Debug, Clone, Default)]
pub struct AwsConnector;

impl AwsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CloudConnector for AwsConnector {
    async fn control_plane(&self, region: &str) -> Result<Arc<dyn ControlPlane>, DeployError> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!("CloudFormation client for {}", region);
        Ok(Arc::new(AwsControlPlane {
            client: aws_sdk_cloudformation::Client::new(&config),
        }))
    }

    async fn object_store(&self) -> Result<Arc<dyn ObjectStore>, DeployError> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Ok(Arc::new(S3ObjectStore {
            client: aws_sdk_s3::Client::new(&config),
        }))
    }
}

/// "Stack with id X does not exist" and friends
fn is_does_not_exist<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.message()
        .is_some_and(|message| message.contains("does not exist"))
}

fn control_plane_error<E>(action: &str, err: E) -> DeployError
where
    E: std::error::Error,
{
    DeployError::ControlPlaneError(format!("{}: {}", action, DisplayErrorContext(&err)))
}

fn object_store_error<E>(action: &str, err: E) -> DeployError
where
    E: std::error::Error,
{
    DeployError::ObjectStoreError(format!("{}: {}", action, DisplayErrorContext(&err)))
}

fn to_utc(timestamp: Option<&SmithyDateTime>) -> DateTime<Utc> {
    timestamp
        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
        .unwrap_or_default()
}

/// CloudFormation control plane
#[derive(Debug, Clone)]
pub struct AwsControlPlane {
    client: aws_sdk_cloudformation::Client,
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    async fn describe_stack(
        &self,
        stack_name_or_id: &str,
    ) -> Result<Option<StackDescription>, DeployError> {
        let output = match self
            .client
            .describe_stacks()
            .stack_name(stack_name_or_id)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if is_does_not_exist(&e) => return Ok(None),
            Err(e) => return Err(control_plane_error("DescribeStacks", e)),
        };

        Ok(output.stacks().first().map(|stack| StackDescription {
            stack_id: stack.stack_id().unwrap_or_default().to_string(),
            stack_name: stack.stack_name().unwrap_or_default().to_string(),
            status: stack
                .stack_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
        }))
    }

    async fn validate_template(
        &self,
        template_body: &str,
    ) -> Result<Vec<TemplateParameter>, DeployError> {
        let output = self
            .client
            .validate_template()
            .template_body(template_body)
            .send()
            .await
            .map_err(|e| control_plane_error("ValidateTemplate", e))?;

        Ok(output
            .parameters()
            .iter()
            .filter_map(|parameter| {
                parameter.parameter_key().map(|key| TemplateParameter {
                    key: key.to_string(),
                    has_default: parameter.default_value().is_some(),
                })
            })
            .collect())
    }

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<String, DeployError> {
        let change_set_type = match request.change_set_type {
            ChangeSetType::Create => aws_sdk_cloudformation::types::ChangeSetType::Create,
            ChangeSetType::Update => aws_sdk_cloudformation::types::ChangeSetType::Update,
        };

        let parameters = request
            .parameters
            .iter()
            .map(|(key, value)| {
                Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build()
            })
            .collect::<Vec<_>>();

        let capabilities = request
            .capabilities
            .iter()
            .map(|capability| Capability::from(capability.as_str()))
            .collect::<Vec<_>>();

        let output = self
            .client
            .create_change_set()
            .stack_name(&request.stack_name)
            .change_set_name(&request.change_set_name)
            .change_set_type(change_set_type)
            .template_body(&request.template_body)
            .set_parameters(Some(parameters))
            .set_role_arn(request.role_arn.clone())
            .set_capabilities((!capabilities.is_empty()).then_some(capabilities))
            .send()
            .await
            .map_err(|e| control_plane_error("CreateChangeSet", e))?;

        output.stack_id().map(str::to_string).ok_or_else(|| {
            DeployError::ControlPlaneError("CreateChangeSet returned no stack id".to_string())
        })
    }

    async fn describe_change_set(
        &self,
        stack_name_or_id: &str,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription, DeployError> {
        let mut description = ChangeSetDescription::default();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_change_set()
                .stack_name(stack_name_or_id)
                .change_set_name(change_set_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| control_plane_error("DescribeChangeSet", e))?;

            description.status = output
                .status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default();
            description.status_reason = output.status_reason().map(str::to_string);
            description
                .changes
                .extend(output.changes().iter().filter_map(|change| {
                    change.resource_change().map(|rc| {
                        ResourceChange::new(
                            rc.action().map(|a| a.as_str()).unwrap_or_default(),
                            rc.resource_type().unwrap_or_default(),
                            rc.logical_resource_id().unwrap_or_default(),
                        )
                    })
                }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(description),
            }
        }
    }

    async fn execute_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<(), DeployError> {
        self.client
            .execute_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await
            .map_err(|e| control_plane_error("ExecuteChangeSet", e))?;
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str) -> Result<(), DeployError> {
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| control_plane_error("DeleteStack", e))?;
        Ok(())
    }

    async fn list_exports(&self) -> Result<Vec<Export>, DeployError> {
        let mut exports = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_exports()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| control_plane_error("ListExports", e))?;

            exports.extend(output.exports().iter().filter_map(|export| {
                Some(Export {
                    name: export.name()?.to_string(),
                    value: export.value()?.to_string(),
                })
            }));

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(exports),
            }
        }
    }

    async fn describe_stack_events(
        &self,
        stack_name_or_id: &str,
        next_token: Option<String>,
    ) -> Result<StackEventPage, DeployError> {
        let output = match self
            .client
            .describe_stack_events()
            .stack_name(stack_name_or_id)
            .set_next_token(next_token)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if is_does_not_exist(&e) => return Ok(StackEventPage::default()),
            Err(e) => return Err(control_plane_error("DescribeStackEvents", e)),
        };

        let events = output
            .stack_events()
            .iter()
            .map(|event| StackEvent {
                event_id: event.event_id().unwrap_or_default().to_string(),
                timestamp: to_utc(event.timestamp()),
                resource_status: event
                    .resource_status()
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
                resource_type: event.resource_type().unwrap_or_default().to_string(),
                logical_resource_id: event.logical_resource_id().unwrap_or_default().to_string(),
                resource_status_reason: event.resource_status_reason().map(str::to_string),
            })
            .collect();

        Ok(StackEventPage {
            events,
            next_token: output.next_token().map(str::to_string),
        })
    }
}

/// S3 object store
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, DeployError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(object_store_error("HeadObject", e))
                }
            }
        }
    }

    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), DeployError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| object_store_error("Read", e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| object_store_error("PutObject", e))?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), DeployError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| object_store_error("PutObject", e))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, DeployError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| object_store_error("GetObject", e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| object_store_error("GetObject body", e))?;
        Ok(data.into_bytes().to_vec())
    }
}
