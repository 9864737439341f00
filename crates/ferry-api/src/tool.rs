//! Tool and entity-group identifiers shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One side of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    /// The tool entities are read from (and deleted from).
    Source,
    /// The tool entities are created in.
    Target,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Source => "source",
            Tool::Target => "target",
        }
    }

    /// The tool on the other side of a link.
    pub fn other(self) -> Tool {
        match self {
            Tool::Source => Tool::Target,
            Tool::Target => Tool::Source,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kinds of record a tool stores.
///
/// The derived ordering is the dependency order: a group may only reference
/// groups that sort before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityGroup {
    Workspaces,
    Clients,
    Projects,
    Tags,
    Tasks,
    UserGroups,
    Users,
    TimeEntries,
}

impl EntityGroup {
    /// Groups scoped to a workspace, in fetch and transfer order.
    pub const TRANSFER_ORDER: [EntityGroup; 7] = [
        EntityGroup::Clients,
        EntityGroup::Projects,
        EntityGroup::Tags,
        EntityGroup::Tasks,
        EntityGroup::UserGroups,
        EntityGroup::Users,
        EntityGroup::TimeEntries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityGroup::Workspaces => "workspaces",
            EntityGroup::Clients => "clients",
            EntityGroup::Projects => "projects",
            EntityGroup::Tags => "tags",
            EntityGroup::Tasks => "tasks",
            EntityGroup::UserGroups => "userGroups",
            EntityGroup::Users => "users",
            EntityGroup::TimeEntries => "timeEntries",
        }
    }

    /// Human readable label used in notifications.
    pub fn label(&self) -> &'static str {
        match self {
            EntityGroup::Workspaces => "Workspaces",
            EntityGroup::Clients => "Clients",
            EntityGroup::Projects => "Projects",
            EntityGroup::Tags => "Tags",
            EntityGroup::Tasks => "Tasks",
            EntityGroup::UserGroups => "User Groups",
            EntityGroup::Users => "Users",
            EntityGroup::TimeEntries => "Time Entries",
        }
    }
}

impl fmt::Display for EntityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no entity group.
#[derive(Debug, Error)]
#[error("unknown entity group: {0}")]
pub struct ParseEntityGroupError(String);

impl FromStr for EntityGroup {
    type Err = ParseEntityGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "workspaces" | "workspace" => Ok(EntityGroup::Workspaces),
            "clients" | "client" => Ok(EntityGroup::Clients),
            "projects" | "project" => Ok(EntityGroup::Projects),
            "tags" | "tag" => Ok(EntityGroup::Tags),
            "tasks" | "task" => Ok(EntityGroup::Tasks),
            "usergroups" | "usergroup" | "groups" => Ok(EntityGroup::UserGroups),
            "users" | "user" => Ok(EntityGroup::Users),
            "timeentries" | "timeentry" | "entries" => Ok(EntityGroup::TimeEntries),
            _ => Err(ParseEntityGroupError(s.to_string())),
        }
    }
}
