//! Bounded polling for long-running control-plane operations

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::errors::DeployError;

/// Fixed-delay polling bound for one wait stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay before every attempt
    pub delay: Duration,

    /// Attempts before giving up
    pub max_attempts: u32,
}

impl PollSettings {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

/// Wait settings for a stack deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Change set creation
    pub change_set: PollSettings,

    /// Stack create, update and delete
    pub stack_operation: PollSettings,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            change_set: PollSettings::new(Duration::from_secs(3), 120),
            stack_operation: PollSettings::new(Duration::from_secs(5), 720),
        }
    }
}

/// What is being waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    ChangeSetCreate,
    StackCreate,
    StackUpdate,
    StackDelete,
}

/// Classification of one observed status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    Pending,
    Failed,
}

impl WaitStage {
    /// Classify an observed status. `None` means the resource does not exist.
    pub fn classify(&self, status: Option<&str>) -> Probe {
        let Some(status) = status else {
            return match self {
                WaitStage::StackDelete => Probe::Ready,
                _ => Probe::Failed,
            };
        };

        match self {
            WaitStage::ChangeSetCreate => match status {
                "CREATE_COMPLETE" => Probe::Ready,
                "FAILED" => Probe::Failed,
                _ => Probe::Pending,
            },
            WaitStage::StackCreate => match status {
                "CREATE_COMPLETE" => Probe::Ready,
                "CREATE_FAILED" | "DELETE_COMPLETE" | "DELETE_FAILED" | "ROLLBACK_FAILED"
                | "ROLLBACK_COMPLETE" => Probe::Failed,
                _ => Probe::Pending,
            },
            WaitStage::StackUpdate => match status {
                "UPDATE_COMPLETE" => Probe::Ready,
                "UPDATE_FAILED" | "UPDATE_ROLLBACK_FAILED" | "UPDATE_ROLLBACK_COMPLETE" => {
                    Probe::Failed
                }
                _ => Probe::Pending,
            },
            WaitStage::StackDelete => match status {
                "DELETE_COMPLETE" => Probe::Ready,
                "DELETE_FAILED"
                | "CREATE_FAILED"
                | "ROLLBACK_FAILED"
                | "UPDATE_ROLLBACK_IN_PROGRESS"
                | "UPDATE_ROLLBACK_FAILED"
                | "UPDATE_ROLLBACK_COMPLETE"
                | "UPDATE_COMPLETE" => Probe::Failed,
                _ => Probe::Pending,
            },
        }
    }
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitStage::ChangeSetCreate => "change set creation",
            WaitStage::StackCreate => "stack creation",
            WaitStage::StackUpdate => "stack update",
            WaitStage::StackDelete => "stack deletion",
        };
        f.write_str(name)
    }
}

/// Status seen by one probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// `None` when the resource does not exist
    pub status: Option<String>,

    pub reason: Option<String>,
}

impl Observation {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            reason: None,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn status_or_missing(&self) -> &str {
        self.status.as_deref().unwrap_or("DOES_NOT_EXIST")
    }
}

/// How a wait ended within its bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(Observation),
    Failed(Observation),
}

/// Poll `probe` until the stage classifies its observation as ready or failed.
///
/// Every attempt sleeps `settings.delay` first. Running out of attempts is an error
/// carrying the last observed status.
pub async fn wait_for<P, PF, S, F>(
    stage: WaitStage,
    settings: &PollSettings,
    mut probe: P,
    sleep_fn: S,
) -> Result<WaitOutcome, DeployError>
where
    P: FnMut() -> PF,
    PF: Future<Output = Result<Observation, DeployError>>,
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut last_status: Option<String> = None;

    for attempt in 1..=settings.max_attempts {
        sleep_fn(settings.delay).await;

        let observation = probe().await?;
        debug!(
            "Waiting for {} ({}/{}): {}",
            stage,
            attempt,
            settings.max_attempts,
            observation.status_or_missing()
        );

        match stage.classify(observation.status.as_deref()) {
            Probe::Ready => return Ok(WaitOutcome::Ready(observation)),
            Probe::Failed => return Ok(WaitOutcome::Failed(observation)),
            Probe::Pending => last_status = Some(observation.status_or_missing().to_string()),
        }
    }

    Err(DeployError::WaitExhausted {
        stage,
        attempts: settings.max_attempts,
        last_status: last_status.unwrap_or_else(|| "UNKNOWN".to_string()),
    })
}
