//! Command implementations shared by the binary and the tests

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::cloud::object_store::{ObjectLocation, ObjectStore};
use crate::cloud::CloudConnector;
use crate::config::global::GlobalConfig;
use crate::config::reader::ConfigReader;
use crate::config::templates::TemplatesConfig;
use crate::deploy::archive;
use crate::deploy::deployer::{DeployerOptions, StackDeployer};
use crate::deploy::task::DeploymentTask;
use crate::deploy::waiter::WaitSettings;
use crate::errors::DeployError;
use crate::group::scheduler::{GroupReport, GroupScheduler};
use crate::models::outcome::DeployOutcome;
use crate::models::stack::{ChangesetDesiredState, StackDesiredState};
use crate::utils;

/// Build the tasks of a group from the templates file and the config sections
pub fn group_tasks(
    config_file: &Path,
    group_name: &str,
    wait: WaitSettings,
) -> Result<Vec<DeploymentTask>, DeployError> {
    let global = GlobalConfig::load(config_file)?;
    let templates = TemplatesConfig::load(global.templates_path(None)?)?;

    templates
        .group_templates(group_name)?
        .into_iter()
        .map(|entry| {
            let settings = global.reader().stack_settings(&entry.name)?;
            Ok(DeploymentTask::new(entry.name, entry.template_path, settings)
                .with_desired_state(entry.stack_desired_state)
                .with_depends_on(entry.depends)
                .with_function_root(entry.function_root)
                .with_wait(wait))
        })
        .collect()
}

pub async fn deploy_group(
    connector: Arc<dyn CloudConnector>,
    config_file: &Path,
    group_name: &str,
    wait: WaitSettings,
) -> Result<GroupReport, DeployError> {
    let tasks = group_tasks(config_file, group_name, wait)?;
    info!("Deploying group {} ({} stacks)", group_name, tasks.len());
    GroupScheduler::new(tasks, connector)?.run().await
}

/// Deploy one template with the settings of a config section
pub async fn deploy_template(
    connector: &dyn CloudConnector,
    config_file: &Path,
    section: &str,
    template_file: &Path,
    function_root: Option<PathBuf>,
    stack_desired_state: StackDesiredState,
) -> Result<DeployOutcome, DeployError> {
    let settings = ConfigReader::load(config_file)?.stack_settings(section)?;
    let task = DeploymentTask::new(section, template_file, settings)
        .with_desired_state(stack_desired_state)
        .with_function_root(function_root);

    task.try_run(connector).await
}

/// A single stack described entirely by options
#[derive(Debug, Clone)]
pub struct DeployStackOptions {
    pub stack_name: String,
    pub region: String,
    pub template_file: PathBuf,
    pub params_file: Option<PathBuf>,
    pub role_arn: Option<String>,
    pub capabilities: String,
    pub stack_desired_state: StackDesiredState,
    pub changeset_desired_state: ChangesetDesiredState,
}

pub async fn deploy_stack(
    connector: &dyn CloudConnector,
    options: DeployStackOptions,
) -> Result<DeployOutcome, DeployError> {
    let parameters = match &options.params_file {
        Some(path) => load_params(path).await?,
        None => BTreeMap::new(),
    };
    let template_body = match options.stack_desired_state {
        StackDesiredState::Present => tokio::fs::read_to_string(&options.template_file).await?,
        StackDesiredState::Deleted => String::new(),
    };

    let mut deployer_options = DeployerOptions::new(options.stack_name, template_body);
    deployer_options.parameters = parameters;
    deployer_options.role_arn = options.role_arn;
    deployer_options.capabilities = utils::split_list(&options.capabilities);
    deployer_options.stack_desired_state = options.stack_desired_state;
    deployer_options.changeset_desired_state = options.changeset_desired_state;

    let client = connector.control_plane(&options.region).await?;
    StackDeployer::new(client, deployer_options).deploy().await
}

/// Parameter file: a JSON object of string values
pub async fn load_params(path: &Path) -> Result<BTreeMap<String, String>, DeployError> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Look up a section value or parameter, falling back to `default` when given
pub fn read_config(
    file: &Path,
    section: &str,
    key: &str,
    default: Option<&str>,
    parameter: bool,
) -> Result<String, DeployError> {
    let reader = ConfigReader::load(file)?;

    let value = if parameter {
        reader.get_parameter_or_default(section, key)?
    } else {
        reader.get_value_or_default(section, key)?
    };

    match (value, default) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.to_string()),
        (None, None) if parameter => reader.get_parameter(section, key),
        (None, None) => reader.get_value(section, key),
    }
}

pub fn module_dir(config_file: &Path) -> Result<PathBuf, DeployError> {
    GlobalConfig::load(config_file)?.module_dir()
}

/// Upload a local archive to `s3://bucket/key`
pub async fn upload_archive(
    store: &dyn ObjectStore,
    archive_url: &str,
    archive_path: &Path,
) -> Result<(), DeployError> {
    let location = ObjectLocation::parse(archive_url)?;
    let body = tokio::fs::read(archive_path).await?;

    store.put_object(&location.bucket, &location.key, body).await?;
    info!("Uploaded {} to {}", archive_path.display(), archive_url);
    Ok(())
}

/// Unpack the configured archive (S3 or a path relative to the config file)
/// into the module directory
pub async fn extract_archive(
    connector: &dyn CloudConnector,
    config_file: &Path,
) -> Result<PathBuf, DeployError> {
    let global = GlobalConfig::load(config_file)?;
    let module_dir = global.module_dir()?;
    let location = global.archive_location()?;

    let bytes = if location.starts_with("s3://") {
        let location = ObjectLocation::parse(&location)?;
        let store = connector.object_store().await?;
        store.get_object(&location.bucket, &location.key).await?
    } else {
        tokio::fs::read(global.config_dir().join(&location)).await?
    };

    let target = module_dir.clone();
    tokio::task::spawn_blocking(move || archive::extract_zip(bytes, &target)).await??;
    info!("Extracted {} into {}", location, module_dir.display());

    Ok(module_dir)
}
