//! Stack config and templates files

pub mod global;
pub mod reader;
pub mod templates;
