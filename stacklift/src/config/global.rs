//! Top-level locations of a stack config file

use std::path::{Path, PathBuf};

use crate::config::reader::ConfigReader;
use crate::errors::DeployError;

const KEY_MODULE_DIR: &str = "ModuleDir";
const KEY_TEMPLATES: &str = "Templates";
const KEY_ARCHIVE_LOCATION: &str = "ArchiveLocation";

/// Module directory, templates file and archive location, resolved against the
/// directory of the config file
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    reader: ConfigReader,
}

impl GlobalConfig {
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, DeployError> {
        Ok(Self::new(ConfigReader::load(config_path)?))
    }

    pub fn new(reader: ConfigReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &ConfigReader {
        &self.reader
    }

    /// Directory holding the config file
    pub fn config_dir(&self) -> PathBuf {
        match self.reader.path().parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn module_dir(&self) -> Result<PathBuf, DeployError> {
        Ok(self
            .config_dir()
            .join(self.reader.get_global_value(KEY_MODULE_DIR)?))
    }

    pub fn templates_path(&self, override_module_dir: Option<&Path>) -> Result<PathBuf, DeployError> {
        let module_dir = match override_module_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.module_dir()?,
        };
        Ok(module_dir.join(self.reader.get_global_value(KEY_TEMPLATES)?))
    }

    /// `s3://bucket/key`, or a path relative to the config directory
    pub fn archive_location(&self) -> Result<String, DeployError> {
        self.reader.get_global_value(KEY_ARCHIVE_LOCATION)
    }
}
