//! Utility functions

use chrono::{DateTime, Utc};

/// Longest change set name the control plane accepts
const MAX_CHANGE_SET_NAME_LEN: usize = 128;

/// `-{%Y%m%d%H%M%S}-{8 hex}`
const CHANGE_SET_SUFFIX_LEN: usize = 24;

/// Mint a change set name: `{stack}-{UTC timestamp}-{random suffix}`.
/// Long stack names are cut so the whole name stays within 128 characters.
pub fn change_set_name(stack_name: &str, now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let prefix: String = stack_name
        .chars()
        .take(MAX_CHANGE_SET_NAME_LEN - CHANGE_SET_SUFFIX_LEN)
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d%H%M%S"), &suffix[..8])
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
