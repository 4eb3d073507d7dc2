//! Templates file: deployment groups and their templates

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::stack::StackDesiredState;

/// Templates file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplatesFile {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupDef>,
}

/// A named group of templates deployed together
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupDef {
    #[serde(default)]
    pub templates: Vec<TemplateDef>,
}

/// One template entry; `name` is also the config section name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateDef {
    pub name: String,

    /// Defaults to `templates/template-{name}.yaml`
    #[serde(default)]
    pub template_path: Option<String>,

    #[serde(default)]
    pub depends: Vec<String>,

    #[serde(default)]
    pub function_root: Option<String>,

    #[serde(default)]
    pub stack_desired_state: StackDesiredState,
}

/// A template entry with paths resolved against the templates file directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub name: String,
    pub template_path: PathBuf,
    pub depends: Vec<String>,
    pub function_root: Option<PathBuf>,
    pub stack_desired_state: StackDesiredState,
}

/// Parsed templates file
#[derive(Debug, Clone)]
pub struct TemplatesConfig {
    dir: PathBuf,
    file: TemplatesFile,
}

impl TemplatesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DeployError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(path, &contents)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, DeployError> {
        let file: TemplatesFile = serde_yaml::from_str(contents)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self { dir, file })
    }

    fn group(&self, group_name: &str) -> Result<&GroupDef, DeployError> {
        self.file.groups.get(group_name).ok_or_else(|| {
            DeployError::ConfigError(format!("Group {} is not defined.", group_name))
        })
    }

    /// Template names of a group in file order
    pub fn group_template_names(&self, group_name: &str) -> Result<Vec<String>, DeployError> {
        Ok(self
            .group(group_name)?
            .templates
            .iter()
            .map(|template| template.name.clone())
            .collect())
    }

    /// Every template of a group, resolved
    pub fn group_templates(&self, group_name: &str) -> Result<Vec<TemplateEntry>, DeployError> {
        Ok(self
            .group(group_name)?
            .templates
            .iter()
            .map(|template| self.resolve(template))
            .collect())
    }

    pub fn template(
        &self,
        group_name: &str,
        template_name: &str,
    ) -> Result<TemplateEntry, DeployError> {
        self.group(group_name)?
            .templates
            .iter()
            .find(|template| template.name == template_name)
            .map(|template| self.resolve(template))
            .ok_or_else(|| {
                DeployError::ConfigError(format!("Template {} is not found.", template_name))
            })
    }

    fn resolve(&self, template: &TemplateDef) -> TemplateEntry {
        let template_path = match &template.template_path {
            Some(path) => self.dir.join(path),
            None => self
                .dir
                .join("templates")
                .join(format!("template-{}.yaml", template.name)),
        };

        TemplateEntry {
            name: template.name.clone(),
            template_path,
            depends: template.depends.clone(),
            function_root: template
                .function_root
                .as_ref()
                .map(|root| self.dir.join(root)),
            stack_desired_state: template.stack_desired_state,
        }
    }
}
