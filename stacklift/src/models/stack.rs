//! Control-plane records and per-stack settings

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::outcome::ResourceChange;

/// Status reported by the control plane while a stack awaits its first change set
pub const REVIEW_IN_PROGRESS: &str = "REVIEW_IN_PROGRESS";

/// Desired end state of a stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackDesiredState {
    #[default]
    Present,
    Deleted,
}

impl FromStr for StackDesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" | "created" => Ok(StackDesiredState::Present),
            "deleted" => Ok(StackDesiredState::Deleted),
            _ => Err(format!("Invalid stack desired state: {}", s)),
        }
    }
}

/// Where the change-flow stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetDesiredState {
    /// Stop once the change set exists (review before apply)
    Created,

    /// Stop right after execution was requested
    Executed,

    /// Wait for the stack operation to finish
    #[default]
    Completed,
}

impl FromStr for ChangesetDesiredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(ChangesetDesiredState::Created),
            "executed" => Ok(ChangesetDesiredState::Executed),
            "completed" => Ok(ChangesetDesiredState::Completed),
            _ => Err(format!("Invalid changeset desired state: {}", s)),
        }
    }
}

/// A stack as returned by describe-stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub stack_id: String,
    pub stack_name: String,
    pub status: String,
}

/// A parameter declared by a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParameter {
    pub key: String,

    /// Parameters without a default must be configured
    pub has_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetType {
    Create,
    Update,
}

impl ChangeSetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSetType::Create => "CREATE",
            ChangeSetType::Update => "UPDATE",
        }
    }
}

impl fmt::Display for ChangeSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to submit a change set
#[derive(Debug, Clone)]
pub struct ChangeSetRequest {
    pub stack_name: String,
    pub change_set_name: String,
    pub change_set_type: ChangeSetType,
    pub template_body: String,
    pub parameters: BTreeMap<String, String>,
    pub role_arn: Option<String>,
    pub capabilities: Vec<String>,
}

/// Current state of a change set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetDescription {
    pub status: String,
    pub status_reason: Option<String>,
    pub changes: Vec<ResourceChange>,
}

/// A stack export (cross-stack output)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub value: String,
}

/// One resource status transition during a stack operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub resource_status: String,
    pub resource_type: String,
    pub logical_resource_id: String,
    pub resource_status_reason: Option<String>,
}

/// One page of stack events, newest first
#[derive(Debug, Clone, Default)]
pub struct StackEventPage {
    pub events: Vec<StackEvent>,
    pub next_token: Option<String>,
}
