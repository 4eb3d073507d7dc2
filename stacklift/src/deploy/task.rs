//! One configured stack bound to a deploy attempt

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{error, info};

use crate::cloud::control_plane::{get_export_value, ControlPlane};
use crate::cloud::CloudConnector;
use crate::config::reader::StackSettings;
use crate::deploy::archive;
use crate::deploy::deployer::{DeployerOptions, StackDeployer};
use crate::deploy::waiter::WaitSettings;
use crate::errors::DeployError;
use crate::models::outcome::DeployOutcome;
use crate::models::stack::{StackDesiredState, TemplateParameter};

const BUCKET_PLACEHOLDER: &str = "%DeployBucketName%";
const CODE_KEY_PLACEHOLDER: &str = "%DeployCodeKey%";

/// A stack to deploy, as declared by the templates file and the config section
#[derive(Debug, Clone)]
pub struct DeploymentTask {
    /// Template name, unique within a group
    pub name: String,

    pub template_path: PathBuf,

    pub settings: StackSettings,

    pub desired_state: StackDesiredState,

    pub depends_on: Vec<String>,

    /// Code bundle packaged when the section enables function deploy
    pub function_root: Option<PathBuf>,

    pub wait: WaitSettings,
}

impl DeploymentTask {
    pub fn new(
        name: impl Into<String>,
        template_path: impl Into<PathBuf>,
        settings: StackSettings,
    ) -> Self {
        Self {
            name: name.into(),
            template_path: template_path.into(),
            settings,
            desired_state: StackDesiredState::default(),
            depends_on: Vec::new(),
            function_root: None,
            wait: WaitSettings::default(),
        }
    }

    pub fn with_desired_state(mut self, desired_state: StackDesiredState) -> Self {
        self.desired_state = desired_state;
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_function_root(mut self, function_root: Option<PathBuf>) -> Self {
        self.function_root = function_root;
        self
    }

    pub fn with_wait(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    /// Deploy the stack. Errors are logged and reported as an absent outcome.
    pub async fn run(&self, connector: &dyn CloudConnector) -> Option<DeployOutcome> {
        match self.try_run(connector).await {
            Ok(outcome) => {
                info!("{}: {}", outcome.stack_name, outcome.status);
                Some(outcome)
            }
            Err(e) => {
                error!("Failed to deploy: {}", e);
                None
            }
        }
    }

    pub async fn try_run(&self, connector: &dyn CloudConnector) -> Result<DeployOutcome, DeployError> {
        let client = connector.control_plane(&self.settings.region).await?;

        let (template_body, parameters) = match self.desired_state {
            StackDesiredState::Deleted => (String::new(), BTreeMap::new()),
            StackDesiredState::Present => {
                let template_body = tokio::fs::read_to_string(&self.template_path)
                    .await
                    .map_err(|e| {
                        DeployError::TemplateError(format!(
                            "Failed to read {}: {}",
                            self.template_path.display(),
                            e
                        ))
                    })?;
                let parameters = self
                    .prepare_parameters(connector, client.as_ref(), &template_body)
                    .await?;
                (template_body, parameters)
            }
        };

        let role_arn = match &self.settings.role_export {
            Some(export_name) => Some(get_export_value(client.as_ref(), export_name).await?),
            None => None,
        };

        let mut options = DeployerOptions::new(&self.settings.stack_name, template_body);
        options.parameters = parameters;
        options.role_arn = role_arn;
        options.capabilities = self.settings.capabilities.clone();
        options.stack_desired_state = self.desired_state;
        options.changeset_desired_state = self.settings.changeset_desired_state;
        options.wait = self.wait;

        StackDeployer::new(client, options).deploy().await
    }

    async fn prepare_parameters(
        &self,
        connector: &dyn CloudConnector,
        client: &dyn ControlPlane,
        template_body: &str,
    ) -> Result<BTreeMap<String, String>, DeployError> {
        let declared = client.validate_template(template_body).await?;

        let (bucket, code_key) = if self.settings.deploy_function {
            self.upload_function(connector).await?
        } else {
            (String::new(), String::new())
        };

        resolve_parameters(&declared, &self.settings.parameters, &bucket, &code_key)
    }

    /// Package the function root and upload it unless the same bundle already exists
    async fn upload_function(
        &self,
        connector: &dyn CloudConnector,
    ) -> Result<(String, String), DeployError> {
        let bucket = self.settings.deploy_bucket_name.clone().ok_or_else(|| {
            DeployError::ConfigError(format!(
                "DeployBucketName is required to deploy a function in {}",
                self.settings.section
            ))
        })?;
        let function_root = self.function_root.clone().ok_or_else(|| {
            DeployError::ConfigError(format!("FunctionRoot is not set for {}", self.name))
        })?;

        let packaged = archive::package(function_root).await?;
        let store = connector.object_store().await?;
        archive::upload_if_absent(store.as_ref(), &bucket, &packaged).await?;

        Ok((bucket, packaged.descriptor.object_key.clone()))
    }
}

/// Pick the configured value of every declared parameter and fill in the bundle
/// placeholders. A declared parameter with a default may be left unconfigured.
pub fn resolve_parameters(
    declared: &[TemplateParameter],
    configured: &BTreeMap<String, String>,
    bucket: &str,
    code_key: &str,
) -> Result<BTreeMap<String, String>, DeployError> {
    let mut resolved = BTreeMap::new();

    for parameter in declared {
        match configured.get(&parameter.key) {
            Some(value) => {
                let value = value
                    .replace(BUCKET_PLACEHOLDER, bucket)
                    .replace(CODE_KEY_PLACEHOLDER, code_key);
                resolved.insert(parameter.key.clone(), value);
            }
            None if parameter.has_default => {}
            None => {
                return Err(DeployError::TemplateError(format!(
                    "Parameter {} is not configured",
                    parameter.key
                )))
            }
        }
    }

    Ok(resolved)
}
