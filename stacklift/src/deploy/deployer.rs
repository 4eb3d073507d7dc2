//! Per-stack deployer: change set creation, execution and completion tracking

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::cloud::control_plane::ControlPlane;
use crate::deploy::events::EventTail;
use crate::deploy::fsm::{DeployerEvent, DeployerFsm};
use crate::deploy::waiter::{wait_for, Observation, WaitOutcome, WaitSettings, WaitStage};
use crate::errors::DeployError;
use crate::models::outcome::{DeployOutcome, ResourceChange};
use crate::models::stack::{
    ChangeSetRequest, ChangeSetType, ChangesetDesiredState, StackDesiredState, REVIEW_IN_PROGRESS,
};
use crate::utils;

/// Reasons the control plane gives for a change set without changes
const NO_OP_REASONS: [&str; 2] = [
    "The submitted information didn't contain changes.",
    "No updates are to be performed",
];

/// Whether a failed change set only failed for having nothing to change
pub fn is_no_op_reason(reason: &str) -> bool {
    NO_OP_REASONS.iter().any(|marker| reason.contains(marker))
}

/// Deployer options
#[derive(Debug, Clone)]
pub struct DeployerOptions {
    pub stack_name: String,

    pub template_body: String,

    pub parameters: BTreeMap<String, String>,

    /// Execution role assumed by the control plane
    pub role_arn: Option<String>,

    pub capabilities: Vec<String>,

    pub stack_desired_state: StackDesiredState,

    pub changeset_desired_state: ChangesetDesiredState,

    pub wait: WaitSettings,
}

impl DeployerOptions {
    pub fn new(stack_name: impl Into<String>, template_body: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template_body: template_body.into(),
            parameters: BTreeMap::new(),
            role_arn: None,
            capabilities: vec!["CAPABILITY_IAM".to_string()],
            stack_desired_state: StackDesiredState::default(),
            changeset_desired_state: ChangesetDesiredState::default(),
            wait: WaitSettings::default(),
        }
    }
}

/// Whether the stack exists for the purpose of a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackExistence {
    Absent,
    Present { stack_id: String, status: String },
}

/// Result of submitting a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetCreation {
    Created { stack_id: String },
    NoOpChange,
}

/// Drives one stack through a single deploy attempt
pub struct StackDeployer {
    client: Arc<dyn ControlPlane>,
    options: DeployerOptions,
    change_set_name: String,
    fsm: DeployerFsm,
}

impl StackDeployer {
    pub fn new(client: Arc<dyn ControlPlane>, options: DeployerOptions) -> Self {
        let change_set_name = utils::change_set_name(&options.stack_name, Utc::now());
        Self {
            client,
            options,
            change_set_name,
            fsm: DeployerFsm::new(),
        }
    }

    pub fn change_set_name(&self) -> &str {
        &self.change_set_name
    }

    /// A stack still in review (never executed) is treated as absent
    pub async fn resolve_existence(&self) -> Result<StackExistence, DeployError> {
        let existence = match self.client.describe_stack(&self.options.stack_name).await? {
            Some(stack) if stack.status != REVIEW_IN_PROGRESS => StackExistence::Present {
                stack_id: stack.stack_id,
                status: stack.status,
            },
            _ => StackExistence::Absent,
        };
        Ok(existence)
    }

    /// Run the deploy attempt, consuming the deployer
    pub async fn deploy(mut self) -> Result<DeployOutcome, DeployError> {
        match self.options.stack_desired_state {
            StackDesiredState::Deleted => self.delete_stack().await,
            StackDesiredState::Present => self.change_stack().await,
        }
    }

    async fn change_stack(&mut self) -> Result<DeployOutcome, DeployError> {
        let change_set_type = match self.resolve_existence().await? {
            StackExistence::Absent => ChangeSetType::Create,
            StackExistence::Present { .. } => ChangeSetType::Update,
        };
        info!("Creating a change set {} ...", self.change_set_name);

        let events = EventTail::capture(self.client.as_ref(), &self.options.stack_name).await?;

        let stack_id = match self.create_change_set(change_set_type).await? {
            ChangeSetCreation::NoOpChange => {
                info!("The changeset does not contain changes.");
                self.fsm.process(DeployerEvent::NoOpChange)?;
                return self.finish(Vec::new());
            }
            ChangeSetCreation::Created { stack_id } => stack_id,
        };
        self.fsm.process(DeployerEvent::ChangeSetReady)?;

        let change_list = self
            .client
            .describe_change_set(&stack_id, &self.change_set_name)
            .await?
            .changes;
        for change in &change_list {
            info!("> {}", change);
        }

        if self.options.changeset_desired_state == ChangesetDesiredState::Created {
            return self.finish(change_list);
        }

        info!("Executing the change set...");
        self.client
            .execute_change_set(&self.options.stack_name, &self.change_set_name)
            .await?;
        self.fsm.process(DeployerEvent::Execute)?;

        if self.options.changeset_desired_state == ChangesetDesiredState::Executed {
            return self.finish(change_list);
        }

        let stage = match change_set_type {
            ChangeSetType::Create => WaitStage::StackCreate,
            ChangeSetType::Update => WaitStage::StackUpdate,
        };
        self.wait_stack(stage, &stack_id, &events).await?;
        self.fsm.process(DeployerEvent::Complete)?;
        info!("Finished.");

        self.finish(change_list)
    }

    async fn delete_stack(&mut self) -> Result<DeployOutcome, DeployError> {
        let Some(stack) = self.client.describe_stack(&self.options.stack_name).await? else {
            info!("The stack does not exist.");
            self.fsm.process(DeployerEvent::AlreadyAbsent)?;
            return self.finish(Vec::new());
        };

        let events = EventTail::capture(self.client.as_ref(), &stack.stack_id).await?;

        info!("Deleting a stack {} ...", self.options.stack_name);
        self.client.delete_stack(&self.options.stack_name).await?;

        self.wait_stack(WaitStage::StackDelete, &stack.stack_id, &events)
            .await?;
        self.fsm.process(DeployerEvent::Delete)?;
        info!("Deleted.");

        self.finish(Vec::new())
    }

    /// Submit the change set and wait until it is ready
    pub async fn create_change_set(
        &self,
        change_set_type: ChangeSetType,
    ) -> Result<ChangeSetCreation, DeployError> {
        let request = ChangeSetRequest {
            stack_name: self.options.stack_name.clone(),
            change_set_name: self.change_set_name.clone(),
            change_set_type,
            template_body: self.options.template_body.clone(),
            parameters: self.options.parameters.clone(),
            role_arn: self.options.role_arn.clone(),
            capabilities: self.options.capabilities.clone(),
        };
        let stack_id = self.client.create_change_set(&request).await?;

        let client = self.client.as_ref();
        let stack_ref = stack_id.as_str();
        let change_set_name = self.change_set_name.as_str();

        let outcome = wait_for(
            WaitStage::ChangeSetCreate,
            &self.options.wait.change_set,
            move || observe_change_set(client, stack_ref, change_set_name),
            tokio::time::sleep,
        )
        .await?;

        match outcome {
            WaitOutcome::Ready(_) => Ok(ChangeSetCreation::Created { stack_id }),
            WaitOutcome::Failed(observation) => {
                let status = observation.status_or_missing().to_string();
                let reason = observation.reason.unwrap_or_default();
                if is_no_op_reason(&reason) {
                    Ok(ChangeSetCreation::NoOpChange)
                } else {
                    Err(DeployError::ChangeSetFailed { status, reason })
                }
            }
        }
    }

    /// Wait for a stack operation, tailing its events after every attempt
    async fn wait_stack(
        &self,
        stage: WaitStage,
        stack_id: &str,
        events: &EventTail,
    ) -> Result<(), DeployError> {
        let client = self.client.as_ref();

        let outcome = wait_for(
            stage,
            &self.options.wait.stack_operation,
            move || observe_stack(client, stack_id, events),
            tokio::time::sleep,
        )
        .await?;

        match outcome {
            WaitOutcome::Ready(_) => Ok(()),
            WaitOutcome::Failed(observation) => Err(DeployError::OperationFailed {
                stack: self.options.stack_name.clone(),
                status: observation.status_or_missing().to_string(),
            }),
        }
    }

    fn finish(&self, change_list: Vec<ResourceChange>) -> Result<DeployOutcome, DeployError> {
        let status = self.fsm.status().ok_or_else(|| {
            DeployError::InvalidTransition(format!("{:?} has no outcome", self.fsm.state()))
        })?;
        Ok(DeployOutcome::new(&self.options.stack_name, status).with_changes(change_list))
    }
}

async fn observe_change_set(
    client: &dyn ControlPlane,
    stack_id: &str,
    change_set_name: &str,
) -> Result<Observation, DeployError> {
    let description = client.describe_change_set(stack_id, change_set_name).await?;
    Ok(Observation::new(description.status).with_reason(description.status_reason))
}

/// Events are flushed even when the describe call fails
async fn observe_stack(
    client: &dyn ControlPlane,
    stack_id: &str,
    events: &EventTail,
) -> Result<Observation, DeployError> {
    let described = client.describe_stack(stack_id).await;
    let flushed = events.flush(client, stack_id).await;

    let observation = match described? {
        Some(stack) => Observation::new(stack.status),
        None => Observation::missing(),
    };
    flushed?;
    Ok(observation)
}
