//! Dependency-ordered deployment of a stack group

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast;
use tracing::{info, info_span, Instrument};

use crate::cloud::CloudConnector;
use crate::deploy::task::DeploymentTask;
use crate::errors::DeployError;
use crate::group::graph::DependencyGraph;
use crate::models::outcome::{DeployOutcome, DeployStatus};

/// A dependency finished in a state that is not safe to build on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnappliedDependency {
    pub task: String,
    pub dependency: String,
    pub status: DeployStatus,
}

impl From<UnappliedDependency> for DeployError {
    fn from(err: UnappliedDependency) -> Self {
        DeployError::DependencyNotApplied {
            task: err.task,
            dependency: err.dependency,
            status: err.status,
        }
    }
}

/// Final state of one task: an outcome, absent (failed or not started), or a fatal error
type Resolution = Result<Option<DeployOutcome>, UnappliedDependency>;

type TaskFuture = Shared<BoxFuture<'static, Resolution>>;

/// Outcomes of a fully deployed group, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReport {
    pub outcomes: Vec<DeployOutcome>,
}

impl GroupReport {
    /// Outcomes that changed something
    pub fn changes(&self) -> impl Iterator<Item = &DeployOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status != DeployStatus::Unchanged)
    }

    /// Markdown "# Changes" section
    pub fn summary(&self) -> String {
        let mut lines = vec![String::new(), "# Changes".to_string(), String::new()];
        for outcome in self.changes() {
            lines.push(outcome.to_string());
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

/// Deploys every task of a group once its dependencies are done
pub struct GroupScheduler {
    graph: DependencyGraph,
    connector: Arc<dyn CloudConnector>,
}

impl GroupScheduler {
    pub fn new(
        tasks: Vec<DeploymentTask>,
        connector: Arc<dyn CloudConnector>,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            graph: DependencyGraph::from_tasks(tasks)?,
            connector,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Deploy the whole group.
    ///
    /// Fails when a dependency ended in a state other than unchanged or completed,
    /// or when any task has no outcome.
    pub async fn run(&self) -> Result<GroupReport, DeployError> {
        let (start_tx, _start_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
        let mut futures: HashMap<String, TaskFuture> = HashMap::new();

        // Dependencies are registered before their dependents
        for name in self.graph.topological_order() {
            let Some(task) = self.graph.task(&name).cloned() else {
                continue;
            };
            let dependencies = task
                .depends_on
                .iter()
                .filter_map(|dep| futures.get(dep).map(|future| (dep.clone(), future.clone())))
                .collect();

            let future = run_gated(
                task,
                dependencies,
                start_tx.subscribe(),
                self.connector.clone(),
            )
            .instrument(info_span!("stack", name = %name))
            .boxed()
            .shared();
            futures.insert(name, future);
        }

        // Ignore send errors: an empty group has no receivers
        let _ = start_tx.send(());

        let names = self.graph.names();
        let resolutions = join_all(names.iter().map(|name| futures[name].clone())).await;

        let mut outcomes = Vec::with_capacity(names.len());
        let mut failed = Vec::new();
        for (name, resolution) in names.iter().zip(resolutions) {
            match resolution? {
                Some(outcome) => outcomes.push(outcome),
                None => failed.push(name.clone()),
            }
        }

        if !failed.is_empty() {
            return Err(DeployError::GroupFailed { failed });
        }

        let report = GroupReport { outcomes };
        info!("{}", report.summary());
        Ok(report)
    }
}

async fn run_gated(
    task: Arc<DeploymentTask>,
    dependencies: Vec<(String, TaskFuture)>,
    mut start_rx: broadcast::Receiver<()>,
    connector: Arc<dyn CloudConnector>,
) -> Resolution {
    // Closed only when the scheduler is gone
    let _ = start_rx.recv().await;

    let resolutions = join_all(dependencies.iter().map(|(_, future)| future.clone())).await;

    let mut outcomes = Vec::with_capacity(resolutions.len());
    for ((dependency, _), resolution) in dependencies.iter().zip(resolutions) {
        match resolution? {
            Some(outcome) => outcomes.push((dependency, outcome)),
            None => {
                info!("Not started");
                return Ok(None);
            }
        }
    }

    for (dependency, outcome) in outcomes {
        if !outcome.status.is_fully_applied() {
            return Err(UnappliedDependency {
                task: task.name.clone(),
                dependency: dependency.clone(),
                status: outcome.status,
            });
        }
    }

    Ok(task.run(connector.as_ref()).await)
}
