//! Stack deployment module

pub mod archive;
pub mod deployer;
pub mod events;
pub mod fsm;
pub mod task;
pub mod waiter;
