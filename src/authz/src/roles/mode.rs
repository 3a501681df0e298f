//! Legacy vs. custom mode selection

use crate::types::CustomRoleDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which resolution model applies to a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleMode {
    Legacy,
    Custom,
}

impl fmt::Display for RoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleMode::Legacy => f.write_str("legacy"),
            RoleMode::Custom => f.write_str("custom"),
        }
    }
}

/// Custom mode iff a `root` definition with exactly `["all"]` is stored
pub fn select_mode(definitions: &[CustomRoleDefinition]) -> RoleMode {
    if definitions.iter().any(CustomRoleDefinition::is_root_sentinel) {
        RoleMode::Custom
    } else {
        RoleMode::Legacy
    }
}
