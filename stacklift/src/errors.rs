//! Error types for stacklift

use thiserror::Error;

use crate::deploy::waiter::WaitStage;
use crate::models::outcome::DeployStatus;

/// Main error type for stack deployment
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Control plane error: {0}")]
    ControlPlaneError(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Failed to create a changeset: {status}: {reason}")]
    ChangeSetFailed { status: String, reason: String },

    #[error("Waiter detected a failure on {stack}: {status}")]
    OperationFailed { stack: String, status: String },

    #[error("Gave up waiting for {stage} after {attempts} attempts (last status: {last_status})")]
    WaitExhausted {
        stage: WaitStage,
        attempts: u32,
        last_status: String,
    },

    #[error("Invalid deployer transition: {0}")]
    InvalidTransition(String),

    #[error("Duplicate task: {0}")]
    DuplicateTask(String),

    #[error("Dependency not found: task '{task}' depends on '{dependency}'")]
    DependencyNotFound { task: String, dependency: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Dependent stack(s) did not complete changing: {task} depends on {dependency} ({status})")]
    DependencyNotApplied {
        task: String,
        dependency: String,
        status: DeployStatus,
    },

    #[error("Deploy failed: {}", failed.join(", "))]
    GroupFailed { failed: Vec<String> },

    #[error("Background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}
