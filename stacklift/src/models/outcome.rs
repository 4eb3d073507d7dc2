//! Deployment outcome models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal status of one stack deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    /// Nothing to do: no-op change set, or delete of an absent stack
    Unchanged,

    /// Change set created and left for review
    ChangeSetCreated,

    /// Change set executed without waiting for completion
    ChangeSetExecuted,

    /// Change set executed and the stack operation finished
    ChangeSetCompleted,

    /// Stack deleted
    Deleted,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Unchanged => "UNCHANGED",
            DeployStatus::ChangeSetCreated => "CHANGESET_CREATED",
            DeployStatus::ChangeSetExecuted => "CHANGESET_EXECUTED",
            DeployStatus::ChangeSetCompleted => "CHANGESET_COMPLETED",
            DeployStatus::Deleted => "DELETED",
        }
    }

    /// Whether a dependent stack may be deployed on top of this outcome
    pub fn is_fully_applied(&self) -> bool {
        matches!(self, DeployStatus::Unchanged | DeployStatus::ChangeSetCompleted)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proposed resource change of a change set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Add, Modify, Remove, Import, Dynamic
    pub action: String,

    pub resource_type: String,

    pub logical_id: String,
}

impl ResourceChange {
    pub fn new(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        logical_id: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            logical_id: logical_id.into(),
        }
    }
}

impl fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<6} {:<25} {:<32}",
            self.action, self.resource_type, self.logical_id
        )
    }
}

/// Result of deploying one stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub stack_name: String,

    pub status: DeployStatus,

    /// Empty unless a change set was actually produced
    #[serde(default)]
    pub change_list: Vec<ResourceChange>,
}

impl DeployOutcome {
    pub fn new(stack_name: impl Into<String>, status: DeployStatus) -> Self {
        Self {
            stack_name: stack_name.into(),
            status,
            change_list: Vec::new(),
        }
    }

    pub fn with_changes(mut self, change_list: Vec<ResourceChange>) -> Self {
        self.change_list = change_list;
        self
    }

    pub fn has_changes(&self) -> bool {
        !self.change_list.is_empty()
    }
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "## {}: {}", self.stack_name, self.status)?;
        for change in &self.change_list {
            write!(f, "\n* {}", change)?;
        }
        Ok(())
    }
}
