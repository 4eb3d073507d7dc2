//! Dependency graph of a deployment group

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::deploy::task::DeploymentTask;
use crate::errors::DeployError;

/// Stack dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Task nodes: name -> task
    nodes: HashMap<String, Arc<DeploymentTask>>,

    /// Original declaration order (for stable ordering)
    insertion_order: Vec<String>,
}

impl DependencyGraph {
    /// Construct and validate the graph: names must be unique, dependencies must
    /// exist and must not form a cycle
    pub fn from_tasks(tasks: Vec<DeploymentTask>) -> Result<Self, DeployError> {
        let mut nodes = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(&task.name) {
                return Err(DeployError::DuplicateTask(task.name));
            }
            insertion_order.push(task.name.clone());
            nodes.insert(task.name.clone(), Arc::new(task));
        }

        let graph = Self {
            nodes,
            insertion_order,
        };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), DeployError> {
        for name in &self.insertion_order {
            for dep in &self.nodes[name].depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(DeployError::DependencyNotFound {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(DeployError::CircularDependency(cycle));
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Task names in declaration order
    pub fn names(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn task(&self, name: &str) -> Option<&Arc<DeploymentTask>> {
        self.nodes.get(name)
    }

    /// Every task after all of its dependencies; ties keep declaration order
    pub fn topological_order(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.len());

        for name in &self.insertion_order {
            self.visit(name, &mut visited, &mut order);
        }

        order
    }

    fn visit(&self, node: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(node.to_string()) {
            return;
        }

        if let Some(task) = self.nodes.get(node) {
            for dep in &task.depends_on {
                self.visit(dep, visited, order);
            }
        }

        order.push(node.to_string());
    }

    /// Detect circular dependencies using DFS
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for name in &self.insertion_order {
            if !visited.contains(name) && self.dfs_cycle(name, &mut visited, &mut stack) {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(task) = self.nodes.get(node) {
            for dep in &task.depends_on {
                // Dependency already on the current path
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}
