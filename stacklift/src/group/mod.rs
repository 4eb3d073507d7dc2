//! Deployment groups

pub mod graph;
pub mod scheduler;
