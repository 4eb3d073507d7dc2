//! stacklift library
//!
//! Deploys groups of dependent CloudFormation stacks through change sets.

pub mod cli;
pub mod cloud;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod group;
pub mod logs;
pub mod models;
pub mod utils;
