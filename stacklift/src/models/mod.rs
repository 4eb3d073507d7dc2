//! Data model shared by the deployer, the tasks and the scheduler

pub mod outcome;
pub mod stack;
