//! Stack config file reader
//!
//! The file has a `Common` mapping merged (shallowly) under every entry of `Stacks`.
//! Scalar values must be strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::errors::DeployError;
use crate::models::stack::ChangesetDesiredState;
use crate::utils;

pub const KEY_STACK_NAME: &str = "StackName";
pub const KEY_REGION: &str = "Region";
pub const KEY_ROLE_EXPORT: &str = "CloudFormationRoleExport";
pub const KEY_CHANGESET_DESIRED_STATE: &str = "ChangesetDesiredState";
pub const KEY_CAPABILITIES: &str = "Capabilities";
pub const KEY_DEPLOY_FUNCTION: &str = "DeployFunction";
pub const KEY_DEPLOY_BUCKET_NAME: &str = "DeployBucketName";
pub const KEY_PARAMETERS: &str = "Parameters";

const DEFAULT_CAPABILITIES: &str = "CAPABILITY_IAM";

/// Parsed stack config file
#[derive(Debug, Clone)]
pub struct ConfigReader {
    path: PathBuf,
    root: Mapping,
    sections: Vec<(String, Mapping)>,
}

impl ConfigReader {
    /// Load and merge a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(path, &contents)
    }

    /// Parse config contents; `path` anchors relative locations
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self, DeployError> {
        let root: Mapping = match serde_yaml::from_str(contents)? {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => {
                return Err(DeployError::ConfigError(
                    "Config root must be a mapping".to_string(),
                ))
            }
        };

        let common = match root.get("Common") {
            Some(value) => as_mapping(value, "Common")?,
            None => Mapping::new(),
        };

        let stacks = root
            .get("Stacks")
            .ok_or_else(|| DeployError::ConfigError("Stacks is not defined".to_string()))
            .and_then(|value| as_mapping(value, "Stacks"))?;

        let mut sections = Vec::with_capacity(stacks.len());
        for (name, value) in stacks {
            let name = as_string(&name)?;
            let mut section = common.clone();
            for (key, value) in as_mapping(&value, &name)? {
                section.insert(key, value);
            }
            sections.push((name, section));
        }

        Ok(Self {
            path: path.into(),
            root,
            sections,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Section names in file order
    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn section(&self, section_name: &str) -> Result<&Mapping, DeployError> {
        self.sections
            .iter()
            .find(|(name, _)| name == section_name)
            .map(|(_, section)| section)
            .ok_or_else(|| {
                DeployError::ConfigError(format!("Section {} is not found", section_name))
            })
    }

    pub fn get_value_or_default(
        &self,
        section_name: &str,
        key: &str,
    ) -> Result<Option<String>, DeployError> {
        self.section(section_name)?
            .get(key)
            .map(as_string)
            .transpose()
    }

    pub fn get_value(&self, section_name: &str, key: &str) -> Result<String, DeployError> {
        self.get_value_or_default(section_name, key)?.ok_or_else(|| {
            DeployError::ConfigError(format!("Key {} is not found in {}", key, section_name))
        })
    }

    /// Configured parameters of a section, in file order
    pub fn section_parameters(
        &self,
        section_name: &str,
    ) -> Result<Vec<(String, String)>, DeployError> {
        let Some(parameters) = self.section(section_name)?.get(KEY_PARAMETERS) else {
            return Ok(Vec::new());
        };
        if parameters.is_null() {
            return Ok(Vec::new());
        }

        as_mapping(parameters, KEY_PARAMETERS)?
            .iter()
            .map(|(key, value)| Ok((as_string(key)?, as_string(value)?)))
            .collect()
    }

    pub fn get_parameter_or_default(
        &self,
        section_name: &str,
        parameter_name: &str,
    ) -> Result<Option<String>, DeployError> {
        Ok(self
            .section_parameters(section_name)?
            .into_iter()
            .find(|(key, _)| key == parameter_name)
            .map(|(_, value)| value))
    }

    pub fn get_parameter(
        &self,
        section_name: &str,
        parameter_name: &str,
    ) -> Result<String, DeployError> {
        self.get_parameter_or_default(section_name, parameter_name)?
            .ok_or_else(|| {
                DeployError::ConfigError(format!(
                    "Parameter {} is not found in {}",
                    parameter_name, section_name
                ))
            })
    }

    /// Top-level value outside of `Common` and `Stacks`
    pub fn get_global_value(&self, key: &str) -> Result<String, DeployError> {
        self.root
            .get(key)
            .map(as_string)
            .transpose()?
            .ok_or_else(|| DeployError::ConfigError(format!("Key {} is not found", key)))
    }

    /// Typed settings of one section
    pub fn stack_settings(&self, section_name: &str) -> Result<StackSettings, DeployError> {
        let changeset_desired_state = match self
            .get_value_or_default(section_name, KEY_CHANGESET_DESIRED_STATE)?
        {
            Some(value) => value.parse().map_err(DeployError::ConfigError)?,
            None => ChangesetDesiredState::default(),
        };

        let capabilities = self
            .get_value_or_default(section_name, KEY_CAPABILITIES)?
            .unwrap_or_else(|| DEFAULT_CAPABILITIES.to_string());

        let deploy_function = self
            .get_value_or_default(section_name, KEY_DEPLOY_FUNCTION)?
            .is_some_and(|value| value == "true");

        Ok(StackSettings {
            section: section_name.to_string(),
            stack_name: self.get_value(section_name, KEY_STACK_NAME)?,
            region: self.get_value(section_name, KEY_REGION)?,
            role_export: self.get_value_or_default(section_name, KEY_ROLE_EXPORT)?,
            changeset_desired_state,
            capabilities: utils::split_list(&capabilities),
            deploy_function,
            deploy_bucket_name: self.get_value_or_default(section_name, KEY_DEPLOY_BUCKET_NAME)?,
            parameters: self.section_parameters(section_name)?.into_iter().collect(),
        })
    }
}

/// Settings of one stack section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSettings {
    /// Section name in the config file (also the template name in a group)
    pub section: String,

    pub stack_name: String,

    pub region: String,

    /// Export whose value is the execution role ARN
    pub role_export: Option<String>,

    pub changeset_desired_state: ChangesetDesiredState,

    pub capabilities: Vec<String>,

    /// Package and upload the function root before deploying
    pub deploy_function: bool,

    pub deploy_bucket_name: Option<String>,

    pub parameters: BTreeMap<String, String>,
}

fn as_mapping(value: &Value, context: &str) -> Result<Mapping, DeployError> {
    match value {
        Value::Mapping(mapping) => Ok(mapping.clone()),
        Value::Null => Ok(Mapping::new()),
        _ => Err(DeployError::ConfigError(format!(
            "{} must be a mapping",
            context
        ))),
    }
}

fn as_string(value: &Value) -> Result<String, DeployError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(DeployError::ConfigError(format!(
            "Value '{}' is not a string",
            serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_else(|_| format!("{:?}", other))
        ))),
    }
}
